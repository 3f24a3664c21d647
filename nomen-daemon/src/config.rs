//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// One parsed configuration section: an ordered list of `key value` and
/// `key { ... }` items. Keys may repeat.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigSection {
    items: Vec<(String, ConfigItem)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigItem {
    Value(String),
    Section(ConfigSection),
}

/// Configuration file errors, reported with enough context to point at
/// the offending option.
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    Io(String, String),
    Syntax {
        file: String,
        line: usize,
        reason: String,
    },
    UnknownSection {
        file: String,
        section: String,
    },
    UnknownOption {
        file: String,
        section: String,
        option: String,
    },
    BadValue {
        file: String,
        section: String,
        option: String,
        value: String,
        reason: String,
    },
}

/// Parser driver in the style of the forwarder configuration file:
/// top-level sections are dispatched to registered handlers; a dry run
/// validates without applying.
pub struct ConfigFile<'a> {
    handlers: BTreeMap<String, SectionHandler<'a>>,
    ignore_unknown_sections: bool,
}

pub type SectionHandler<'a> = Box<
    dyn FnMut(&ConfigSection, bool, &str) -> Result<(), ConfigError> + 'a,
>;

// ===== impl ConfigSection =====

impl ConfigSection {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigItem)> {
        self.items.iter().map(|(key, item)| (key.as_str(), item))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigItem> {
        self.items
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, item)| item)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ConfigItem::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn section(&self, key: &str) -> Option<&ConfigSection> {
        match self.get(key) {
            Some(ConfigItem::Section(section)) => Some(section),
            _ => None,
        }
    }

    /// Parses the hierarchical `section { key value ... }` format.
    pub fn parse(input: &str, file: &str) -> Result<ConfigSection, ConfigError> {
        let mut tokens = tokenize(input, file)?;
        tokens.reverse();
        let section = parse_items(&mut tokens, file, true)?;
        Ok(section)
    }

    pub fn parse_file(path: &Path) -> Result<ConfigSection, ConfigError> {
        let file = path.display().to_string();
        let input = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::Io(file.clone(), error.to_string()))?;
        ConfigSection::parse(&input, &file)
    }
}

impl std::fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, item) in &self.items {
            match item {
                ConfigItem::Value(value) => writeln!(f, "{key} {value}")?,
                ConfigItem::Section(section) => {
                    writeln!(f, "{key} {{")?;
                    let mut body = String::new();
                    write!(body, "{section}")?;
                    for line in body.lines() {
                        writeln!(f, "  {line}")?;
                    }
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

// ===== impl ConfigFile =====

impl<'a> ConfigFile<'a> {
    pub fn new() -> ConfigFile<'a> {
        ConfigFile {
            handlers: BTreeMap::new(),
            ignore_unknown_sections: false,
        }
    }

    pub fn add_section_handler(
        &mut self,
        section: &str,
        handler: SectionHandler<'a>,
    ) {
        self.handlers.insert(section.to_owned(), handler);
    }

    /// With this policy, sections without a registered handler are
    /// skipped instead of failing the parse.
    pub fn set_ignore_unknown_sections(&mut self, ignore: bool) {
        self.ignore_unknown_sections = ignore;
    }

    pub fn parse(
        &mut self,
        input: &str,
        is_dry_run: bool,
        file: &str,
    ) -> Result<(), ConfigError> {
        let root = ConfigSection::parse(input, file)?;
        self.process(&root, is_dry_run, file)
    }

    pub fn parse_path(
        &mut self,
        path: &Path,
        is_dry_run: bool,
    ) -> Result<(), ConfigError> {
        let root = ConfigSection::parse_file(path)?;
        self.process(&root, is_dry_run, &path.display().to_string())
    }

    fn process(
        &mut self,
        root: &ConfigSection,
        is_dry_run: bool,
        file: &str,
    ) -> Result<(), ConfigError> {
        for (key, item) in root.iter() {
            let section = match item {
                ConfigItem::Section(section) => section,
                ConfigItem::Value(_) => {
                    return Err(ConfigError::Syntax {
                        file: file.to_owned(),
                        line: 0,
                        reason: format!(
                            "expected a section, found bare option {key}"
                        ),
                    });
                }
            };
            match self.handlers.get_mut(key) {
                Some(handler) => handler(section, is_dry_run, file)?,
                None if self.ignore_unknown_sections => (),
                None => {
                    return Err(ConfigError::UnknownSection {
                        file: file.to_owned(),
                        section: key.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for ConfigFile<'_> {
    fn default() -> Self {
        ConfigFile::new()
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(file, reason) => {
                write!(f, "{file}: {reason}")
            }
            ConfigError::Syntax { file, line, reason } => {
                write!(f, "{file}:{line}: {reason}")
            }
            ConfigError::UnknownSection { file, section } => {
                write!(f, "{file}: unknown section {section}")
            }
            ConfigError::UnknownOption { file, section, option } => {
                write!(f, "{file}: unknown option {section}.{option}")
            }
            ConfigError::BadValue { file, section, option, value, reason } => {
                write!(
                    f,
                    "{file}: invalid value \"{value}\" for {section}.{option}: {reason}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== typed option accessors =====

/// Parses a `yes`/`no` option; the literals are case-sensitive.
pub fn parse_yes_no(
    value: &str,
    file: &str,
    section: &str,
    option: &str,
) -> Result<bool, ConfigError> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(ConfigError::BadValue {
            file: file.to_owned(),
            section: section.to_owned(),
            option: option.to_owned(),
            value: value.to_owned(),
            reason: "expected yes or no".to_owned(),
        }),
    }
}

/// Parses a numeric option, enforcing a declared range. Negative input
/// for unsigned fields fails the underlying parse.
pub fn parse_number<T>(
    value: &str,
    range: std::ops::RangeInclusive<T>,
    file: &str,
    section: &str,
    option: &str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let bad = |reason: String| ConfigError::BadValue {
        file: file.to_owned(),
        section: section.to_owned(),
        option: option.to_owned(),
        value: value.to_owned(),
        reason,
    };
    let number = value
        .parse::<T>()
        .map_err(|_| bad("expected a number".to_owned()))?;
    if number < *range.start() || number > *range.end() {
        return Err(bad(format!(
            "expected a number in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(number)
}

// ===== parser internals =====

#[derive(Debug, Eq, PartialEq)]
enum Token {
    Word(String, usize),
    LBrace(usize),
    RBrace(usize),
}

fn tokenize(input: &str, file: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;
    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            // Comment to end of line.
            ';' | '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace(line));
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace(line));
            }
            '"' => {
                chars.next();
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\n') | None => {
                            return Err(ConfigError::Syntax {
                                file: file.to_owned(),
                                line,
                                reason: "unterminated string".to_owned(),
                            });
                        }
                        Some(c) => word.push(c),
                    }
                }
                tokens.push(Token::Word(word, line));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '#')
                    {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word, line));
            }
        }
    }
    Ok(tokens)
}

// `tokens` is reversed so `pop` yields the next token. The format is
// line-oriented: a key followed by a word on the same line is a
// key-value pair; a key alone on its line is a bare key with an empty
// value (used by list-style sections such as network_region).
fn parse_items(
    tokens: &mut Vec<Token>,
    file: &str,
    top_level: bool,
) -> Result<ConfigSection, ConfigError> {
    let mut section = ConfigSection::default();
    loop {
        let (key, key_line) = match tokens.pop() {
            None if top_level => return Ok(section),
            None => {
                return Err(ConfigError::Syntax {
                    file: file.to_owned(),
                    line: 0,
                    reason: "unexpected end of input, missing }".to_owned(),
                });
            }
            Some(Token::RBrace(line)) if top_level => {
                return Err(ConfigError::Syntax {
                    file: file.to_owned(),
                    line,
                    reason: "unmatched }".to_owned(),
                });
            }
            Some(Token::RBrace(_)) => return Ok(section),
            Some(Token::LBrace(line)) => {
                return Err(ConfigError::Syntax {
                    file: file.to_owned(),
                    line,
                    reason: "expected an option name, found {".to_owned(),
                });
            }
            Some(Token::Word(word, line)) => (word, line),
        };

        match tokens.last() {
            Some(Token::LBrace(_)) => {
                tokens.pop();
                let subsection = parse_items(tokens, file, false)?;
                section
                    .items
                    .push((key, ConfigItem::Section(subsection)));
            }
            Some(Token::Word(_, line)) if *line == key_line => {
                let Some(Token::Word(value, _)) = tokens.pop() else {
                    unreachable!();
                };
                section.items.push((key, ConfigItem::Value(value)));
            }
            // Bare key: the next token starts a new item.
            _ => section.items.push((key, ConfigItem::Value(String::new()))),
        }
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_sections() {
        let input = r#"
; forwarder configuration
general
{
  user nomen
  group nomen
}
tables
{
  cs_max_packets 65536
  strategy_choice
  {
    / /localhost/nfd/strategy/best-route
    /localhost /localhost/nfd/strategy/best-route
  }
}
"#;
        let root = ConfigSection::parse(input, "test.conf").unwrap();
        let general = root.section("general").unwrap();
        assert_eq!(general.value("user"), Some("nomen"));
        assert_eq!(general.value("group"), Some("nomen"));

        let tables = root.section("tables").unwrap();
        assert_eq!(tables.value("cs_max_packets"), Some("65536"));
        let choices = tables.section("strategy_choice").unwrap();
        assert_eq!(choices.iter().count(), 2);
    }

    #[test]
    fn reject_malformed() {
        assert!(ConfigSection::parse("a {", "t").is_err());
        assert!(ConfigSection::parse("}", "t").is_err());
        assert!(ConfigSection::parse("a \"unterminated", "t").is_err());
    }

    #[test]
    fn bare_keys_make_list_sections() {
        let input = "network_region\n{\n  /example/region\n  /other\n}\n";
        let root = ConfigSection::parse(input, "t").unwrap();
        let regions = root.section("network_region").unwrap();
        let keys: Vec<_> = regions.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["/example/region", "/other"]);
        assert_eq!(regions.value("/other"), Some(""));
    }

    #[test]
    fn quoted_values_and_comments() {
        let input = "log\n{\n  default_level INFO ; inline comment\n  path \"/var/log/x y.log\"\n}\n";
        let root = ConfigSection::parse(input, "t").unwrap();
        let log = root.section("log").unwrap();
        assert_eq!(log.value("default_level"), Some("INFO"));
        assert_eq!(log.value("path"), Some("/var/log/x y.log"));
    }

    #[test]
    fn unknown_sections_fail_unless_ignored() {
        let input = "mystery\n{\n  key value\n}\n";
        let mut config = ConfigFile::new();
        assert!(matches!(
            config.parse(input, true, "t"),
            Err(ConfigError::UnknownSection { .. })
        ));

        config.set_ignore_unknown_sections(true);
        assert!(config.parse(input, true, "t").is_ok());
    }

    #[test]
    fn handlers_receive_sections() {
        let mut seen = Vec::new();
        {
            let mut config = ConfigFile::new();
            config.add_section_handler(
                "general",
                Box::new(|section, is_dry_run, _file| {
                    seen.push((
                        section.value("user").unwrap().to_owned(),
                        is_dry_run,
                    ));
                    Ok(())
                }),
            );
            config
                .parse("general\n{\n  user root\n}\n", true, "t")
                .unwrap();
        }
        assert_eq!(seen, vec![("root".to_owned(), true)]);
    }

    #[test]
    fn yes_no_is_literal() {
        assert_eq!(parse_yes_no("yes", "f", "s", "o"), Ok(true));
        assert_eq!(parse_yes_no("no", "f", "s", "o"), Ok(false));
        assert!(parse_yes_no("Yes", "f", "s", "o").is_err());
        assert!(parse_yes_no("true", "f", "s", "o").is_err());
    }

    #[test]
    fn numbers_are_range_checked() {
        assert_eq!(parse_number::<u64>("25", 0..=600, "f", "s", "o"), Ok(25));
        assert!(parse_number::<u64>("601", 0..=600, "f", "s", "o").is_err());
        // Negative input for an unsigned field fails the parse.
        assert!(parse_number::<u64>("-1", 0..=600, "f", "s", "o").is_err());
    }
}
