//! INI credential profiles
//!
//! The source storage credentials arrive as an INI document:
//!
//! ```text
//! [DEFAULT]
//! user=ocid1.user.oc1..aaaa
//! fingerprint=a4:b3:c2:...
//! key_file=~/.oci/key.pem
//! tenancy=ocid1.tenancy.oc1..bbbb
//! region=us-ashburn-1
//! ```
//!
//! Keys are case-insensitive and stored lowercase. Entries of `[DEFAULT]` are
//! inherited by every other section. Section and entry order is preserved when
//! the document is rendered back.

use crate::error::{PipelineError, Result};

/// Name of the section whose entries every other section inherits
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Profile entry pointing at the private key file
pub const KEY_FILE_ENTRY: &str = "key_file";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }
}

/// Parsed INI document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    /// Parse INI text. Entries outside any section are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: Vec<Section> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') {
                let name = trimmed
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        PipelineError::invalid_profile(format!(
                            "line {}: malformed section header '{}'",
                            line_no, trimmed
                        ))
                    })?;

                if sections.iter().any(|s| s.name == name) {
                    return Err(PipelineError::invalid_profile(format!(
                        "line {}: duplicate section [{}]",
                        line_no, name
                    )));
                }
                sections.push(Section::new(name));
                continue;
            }

            let section = sections.last_mut().ok_or_else(|| {
                PipelineError::invalid_profile(format!(
                    "line {}: entry before the first section header",
                    line_no
                ))
            })?;

            // Indented lines continue the previous value
            if raw.starts_with(char::is_whitespace) {
                if let Some(last) = section.entries.last_mut() {
                    last.1.push('\n');
                    last.1.push_str(trimmed);
                    continue;
                }
            }

            let split_at = trimmed.find(['=', ':']).ok_or_else(|| {
                PipelineError::invalid_profile(format!(
                    "line {}: expected 'key = value', found '{}'",
                    line_no, trimmed
                ))
            })?;

            let key = trimmed[..split_at].trim().to_lowercase();
            let value = trimmed[split_at + 1..].trim();
            if key.is_empty() {
                return Err(PipelineError::invalid_profile(format!(
                    "line {}: empty key",
                    line_no
                )));
            }

            section.set(&key, value);
        }

        Ok(Self { sections })
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Set `key` in `section`, creating the section when missing
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let key = key.to_lowercase();
        match self.sections.iter_mut().find(|s| s.name == section) {
            Some(existing) => existing.set(&key, value),
            None => {
                let mut created = Section::new(section);
                created.set(&key, value);
                self.sections.push(created);
            },
        }
    }

    /// Resolved view of one section, including inherited `[DEFAULT]` entries
    pub fn section(&self, name: &str) -> Option<ProfileSection> {
        let own = self.sections.iter().find(|s| s.name == name)?;

        let mut entries: Vec<(String, String)> = Vec::new();
        if name != DEFAULT_SECTION {
            if let Some(defaults) = self.sections.iter().find(|s| s.name == DEFAULT_SECTION) {
                entries.extend(
                    defaults
                        .entries
                        .iter()
                        .filter(|(k, _)| own.get(k).is_none())
                        .cloned(),
                );
            }
        }
        entries.extend(own.entries.iter().cloned());

        Some(ProfileSection {
            name: name.to_string(),
            entries,
        })
    }

    /// Render back to INI text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                let value = value.replace('\n', "\n\t");
                out.push_str(&format!("{} = {}\n", key, value));
            }
            out.push('\n');
        }
        out
    }
}

/// Resolved key/value settings of one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl ProfileSection {
    pub fn new(name: impl Into<String>, entries: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Value of a mandatory entry
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            PipelineError::invalid_profile(format!(
                "profile [{}] has no '{}' entry",
                self.name, key
            ))
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
