use crate::signal::path::coerce_to_string;
use crate::signal::Event;

/// Rendered in place of a placeholder whose field is not in the payload.
pub const MISSING_VALUE: &str = "N/A";

/// Substitutes `{{field.path}}` placeholders with payload values.
///
/// Whitespace inside the braces is ignored. An unterminated `{{` is copied
/// through unchanged.
pub fn render(template: &str, event: &Event) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                match event.field(key).value() {
                    Some(value) => out.push_str(&coerce_to_string(value)),
                    None => out.push_str(MISSING_VALUE),
                }
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn default_message(rule_name: &str, event: &Event) -> String {
    format!(
        "{rule_name}: {} event from {}",
        event.event_type(),
        event.source()
    )
}
