//! Reading INI deployment files.
//!
//! The format is the classic INI dialect used by existing deployment
//! files:
//!
//! * `[section]` headers, where `[DEFAULT]` provides values visible in
//!   every other section,
//! * `key = value` or `key: value` options with keys folded to lower case,
//! * full line comments starting with `#` or `;`,
//! * indented lines continuing the value of the previous option,
//! * `%(name)s` references to other options, with `%%` for a literal `%`.

use std::collections::BTreeMap;
use std::fmt;


/// The name of the section providing defaults for all others.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// How deep references may nest before we give up.
const MAX_INTERPOLATION_DEPTH: usize = 10;

/// A set of options.
pub type Options = BTreeMap<String, String>;


//------------ Ini -----------------------------------------------------------

/// A parsed INI file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ini {
    defaults: Options,

    /// The sections other than `[DEFAULT]` in the order they appeared.
    sections: Vec<(String, Options)>,
}

impl Ini {
    /// Parses the content of an INI file.
    pub fn parse(content: &str) -> Result<Self, IniError> {
        let mut parser = Parser::default();
        for (idx, line) in content.lines().enumerate() {
            parser.line(idx + 1, line)?;
        }
        Ok(parser.finish())
    }

    /// Returns the values of the `[DEFAULT]` section.
    pub fn defaults(&self) -> &Options {
        &self.defaults
    }

    /// Returns the names of all sections except `[DEFAULT]`.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// Returns the options defined in a section itself.
    pub fn section(&self, name: &str) -> Option<&Options> {
        self.sections.iter().find(|(section, _)| section == name).map(
            |(_, options)| options
        )
    }

    /// Returns the uninterpolated options visible in a section.
    ///
    /// These are the defaults overridden by the section's own values.
    pub fn items_raw(&self, section: &str) -> Result<Options, IniError> {
        let own = self.section(section).ok_or_else(|| {
            IniError::NoSection(section.into())
        })?;
        let mut res = self.defaults.clone();
        res.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(res)
    }

    /// Returns the interpolated options visible in a section.
    pub fn items(&self, section: &str) -> Result<Options, IniError> {
        let raw = self.items_raw(section)?;
        raw.iter().map(|(key, value)| {
            interpolate(key, value, &raw).map(|value| (key.clone(), value))
        }).collect()
    }

    /// Returns the interpolated value of an option in a section.
    pub fn get(
        &self, section: &str, option: &str
    ) -> Result<Option<String>, IniError> {
        let raw = self.items_raw(section)?;
        let option = option.to_ascii_lowercase();
        match raw.get(&option) {
            Some(value) => interpolate(&option, value, &raw).map(Some),
            None => Ok(None),
        }
    }
}


//------------ Parser --------------------------------------------------------

#[derive(Default)]
struct Parser {
    ini: Ini,

    /// The current section, `None` before the first header.
    current: Option<Current>,

    /// The option of the current section that may still be continued.
    last_option: Option<LastOption>,
}

enum Current {
    Defaults,
    Section(usize),
}

struct LastOption {
    key: String,
    indent: usize,
    lines: Vec<String>,

    /// Blank lines seen since the last line of the value.
    blanks: usize,
}

impl Parser {
    fn line(&mut self, number: usize, line: &str) -> Result<(), IniError> {
        let trimmed = line.trim();
        let indent = line.len() - line.trim_start().len();

        if trimmed.is_empty() {
            if let Some(last) = self.last_option.as_mut() {
                last.blanks += 1;
            }
            return Ok(())
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            return Ok(())
        }

        if let Some(last) = self.last_option.as_mut() {
            if indent > last.indent {
                last.lines.extend(
                    std::iter::repeat_n(String::new(), last.blanks)
                );
                last.blanks = 0;
                last.lines.push(trimmed.to_string());
                return Ok(())
            }
        }
        self.finish_option();

        if let Some(name) = trimmed.strip_prefix('[').and_then(|rest| {
            rest.strip_suffix(']')
        }) {
            return self.header(number, name)
        }

        if self.current.is_none() {
            return Err(IniError::MissingSectionHeader(number))
        }

        let pos = match trimmed.find(['=', ':']) {
            Some(pos) => pos,
            None => return Err(IniError::Parse(number, line.to_string())),
        };
        let key = trimmed[..pos].trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(IniError::Parse(number, line.to_string()))
        }
        if self.options().contains_key(&key) {
            return Err(IniError::DuplicateOption(
                number, self.section_name(), key
            ))
        }
        let value = trimmed[pos + 1..].trim().to_string();
        self.options().insert(key.clone(), String::new());
        self.last_option = Some(LastOption {
            key, indent, lines: vec![value], blanks: 0
        });
        Ok(())
    }

    fn header(&mut self, number: usize, name: &str) -> Result<(), IniError> {
        if name.is_empty() {
            return Err(IniError::Parse(number, format!("[{name}]")))
        }
        if name == DEFAULT_SECTION {
            self.current = Some(Current::Defaults);
            return Ok(())
        }
        if self.ini.has_section(name) {
            return Err(IniError::DuplicateSection(number, name.into()))
        }
        self.ini.sections.push((name.to_string(), Options::new()));
        self.current = Some(Current::Section(self.ini.sections.len() - 1));
        Ok(())
    }

    fn options(&mut self) -> &mut Options {
        match self.current {
            Some(Current::Section(idx)) => &mut self.ini.sections[idx].1,
            _ => &mut self.ini.defaults,
        }
    }

    fn section_name(&self) -> String {
        match self.current {
            Some(Current::Section(idx)) => self.ini.sections[idx].0.clone(),
            _ => DEFAULT_SECTION.to_string(),
        }
    }

    fn finish_option(&mut self) {
        if let Some(last) = self.last_option.take() {
            let value = last.lines.join("\n");
            self.options().insert(last.key, value);
        }
    }

    fn finish(mut self) -> Ini {
        self.finish_option();
        self.ini
    }
}


//------------ Interpolation -------------------------------------------------

/// Resolves the `%(name)s` references in the value of `option`.
///
/// References are looked up in `vars` and resolved recursively.
pub fn interpolate(
    option: &str, value: &str, vars: &Options
) -> Result<String, IniError> {
    let mut res = String::new();
    interpolate_into(option, value, vars, 1, &mut res)?;
    Ok(res)
}

fn interpolate_into(
    option: &str,
    value: &str,
    vars: &Options,
    depth: usize,
    target: &mut String,
) -> Result<(), IniError> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(IniError::InterpolationDepth(option.into()))
    }
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        target.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if let Some(tail) = rest.strip_prefix("%%") {
            target.push('%');
            rest = tail;
        }
        else if let Some(tail) = rest.strip_prefix("%(") {
            let end = tail.find(")s").ok_or_else(|| {
                IniError::InterpolationSyntax(option.into(), rest.into())
            })?;
            let name = tail[..end].to_ascii_lowercase();
            let referenced = vars.get(&name).ok_or_else(|| {
                IniError::InterpolationMissing(option.into(), name.clone())
            })?;
            if referenced.contains('%') {
                interpolate_into(option, referenced, vars, depth + 1, target)?;
            }
            else {
                target.push_str(referenced);
            }
            rest = &tail[end + 2..];
        }
        else {
            return Err(IniError::InterpolationSyntax(
                option.into(), rest.into()
            ))
        }
    }
    target.push_str(rest);
    Ok(())
}


//------------ IniError ------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IniError {
    MissingSectionHeader(usize),
    Parse(usize, String),
    DuplicateSection(usize, String),
    DuplicateOption(usize, String, String),
    NoSection(String),
    InterpolationSyntax(String, String),
    InterpolationMissing(String, String),
    InterpolationDepth(String),
}

impl fmt::Display for IniError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IniError::MissingSectionHeader(line) => {
                write!(f, "line {line}: option outside of a section")
            }
            IniError::Parse(line, content) => {
                write!(f, "line {line}: cannot parse '{content}'")
            }
            IniError::DuplicateSection(line, section) => {
                write!(f, "line {line}: section '{section}' already exists")
            }
            IniError::DuplicateOption(line, section, option) => write!(
                f, "line {line}: option '{option}' in section '{section}' \
                    already exists"
            ),
            IniError::NoSection(section) => {
                write!(f, "no section '{section}'")
            }
            IniError::InterpolationSyntax(option, rest) => write!(
                f, "bad interpolation syntax in option '{option}' at '{rest}'"
            ),
            IniError::InterpolationMissing(option, reference) => write!(
                f, "option '{option}' references unknown option '{reference}'"
            ),
            IniError::InterpolationDepth(option) => write!(
                f, "references in option '{option}' nest too deeply"
            ),
        }
    }
}

impl std::error::Error for IniError { }


//============ Tests =========================================================
