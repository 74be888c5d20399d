//! Rendering configuration templates.
//!
//! A template refers to values by slots: an upper case name in square
//! brackets such as `[PKI_INSTANCE_NAME]`. A literal `[` is written `[[`.
//! Brackets around anything that is not a slot name are kept as they are.

use std::collections::BTreeMap;
use std::fmt;


/// Renders a template, replacing every slot with its value.
pub fn render(
    template: &str, slots: &BTreeMap<String, String>
) -> Result<String, TemplateError> {
    let mut res = String::with_capacity(template.len());
    for (idx, line) in template.split_inclusive('\n').enumerate() {
        render_line(line, slots, &mut res).map_err(|slot| {
            TemplateError { line: idx + 1, slot }
        })?;
    }
    Ok(res)
}

/// Renders a single line. Returns the name of an unknown slot on error.
fn render_line(
    line: &str, slots: &BTreeMap<String, String>, target: &mut String
) -> Result<(), String> {
    let mut rest = line;
    while let Some(pos) = rest.find('[') {
        target.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        if let Some(tail) = rest.strip_prefix('[') {
            target.push('[');
            rest = tail;
            continue
        }
        match rest.find(']') {
            Some(end) if is_slot_name(&rest[..end]) => {
                let name = &rest[..end];
                let value = slots.get(name).ok_or_else(|| name.to_string())?;
                target.push_str(value);
                rest = &rest[end + 1..];
            }
            _ => target.push('['),
        }
    }
    target.push_str(rest);
    Ok(())
}

fn is_slot_name(name: &str) -> bool {
    name.starts_with(|ch: char| ch.is_ascii_uppercase())
        && name.chars().all(|ch| {
            ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_'
        })
}


//------------ TemplateError -------------------------------------------------

/// A template referred to a slot without a value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateError {
    pub line: usize,
    pub slot: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: unknown slot [{}]", self.line, self.slot)
    }
}

impl std::error::Error for TemplateError { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> BTreeMap<String, String> {
        [
            ("PKI_INSTANCE_NAME", "pki-tomcat"),
            ("PKI_HTTPS_PORT", "8443"),
        ].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn render_slots() {
        let rendered = render(
            "name = \"[PKI_INSTANCE_NAME]\"\nport = [PKI_HTTPS_PORT]\n\
             list = [[1, 2]\nkeep = [lower] [ and a [Mixed_case]\n",
            &slots()
        ).unwrap();
        assert_eq!(
            rendered,
            "name = \"pki-tomcat\"\nport = 8443\n\
             list = [1, 2]\nkeep = [lower] [ and a [Mixed_case]\n"
        );
    }

    #[test]
    fn unknown_slot() {
        assert_eq!(
            render("a = 1\nb = [PKI_NOPE]\n", &slots()),
            Err(TemplateError { line: 2, slot: "PKI_NOPE".into() })
        );
    }
}
