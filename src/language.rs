use strum_macros::EnumString;

/// Source language of the debugged program, as announced by the engine in its init message.
///
/// Only languages with their own naming convention for evaluated properties
/// are listed; everything else falls into [`Language::Other`].
#[derive(Clone, PartialEq, Eq, Debug, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Language {
    #[strum(serialize = "php")]
    Php,
    #[strum(serialize = "perl")]
    Perl,
    #[strum(serialize = "python")]
    Python,
    #[strum(serialize = "ruby")]
    Ruby,
    #[strum(default)]
    Other(String),
}

impl Language {
    /// Parse an init message `language` attribute. Never fails, unknown names become [`Language::Other`].
    pub fn from_attr(attr: &str) -> Self {
        let attr = attr.to_lowercase();
        attr.parse().unwrap_or(Language::Other(attr))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Language::Php => "php",
            Language::Perl => "perl",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Other(name) => name,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Other(String::new())
    }
}
