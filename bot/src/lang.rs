//! Localization of server-side text templates
//!
//! Servers send some chat lines as translation keys plus positional
//! parameters (`"death.attack.fall"`, `["Alice"]`). A [`Translator`] turns
//! those into readable text for a locale. [`LangTable`] is a JSON-backed
//! implementation; [`Passthrough`] leaves keys untouched.

use log::debug;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LangError {
    #[error("failed to read language file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid language file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub trait Translator: Send + Sync {
    fn translate(&self, locale: &str, template: &str, params: &[String]) -> String;
}

/// Formats the template with its parameters without any lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Translator for Passthrough {
    fn translate(&self, _locale: &str, template: &str, params: &[String]) -> String {
        format_template(template, params)
    }
}

/// Translation strings grouped by locale: `{ "pt_BR": { "key": "text %s" } }`
#[derive(Debug, Default, Clone)]
pub struct LangTable {
    locales: HashMap<String, HashMap<String, String>>,
}

impl LangTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, LangError> {
        let locales: HashMap<String, HashMap<String, String>> = serde_json::from_str(json)?;
        Ok(Self { locales })
    }

    pub fn from_file(path: &Path) -> Result<Self, LangError> {
        let contents = std::fs::read_to_string(path)?;
        let table = Self::from_json(&contents)?;
        debug!(
            "Loaded {} locale(s) from {}",
            table.locales.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn insert(&mut self, locale: &str, key: &str, value: &str) {
        self.locales
            .entry(locale.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Looks up a key, accepting the `%key` form servers use for inline references.
    pub fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        let key = key.strip_prefix('%').unwrap_or(key);
        self.locales
            .get(locale)
            .and_then(|strings| strings.get(key))
            .map(String::as_str)
    }

    fn resolve<'a>(&'a self, locale: &str, text: &'a str) -> &'a str {
        self.lookup(locale, text).unwrap_or(text)
    }
}

impl Translator for LangTable {
    fn translate(&self, locale: &str, template: &str, params: &[String]) -> String {
        let template = self.resolve(locale, template);
        let params: Vec<String> = params
            .iter()
            .map(|param| self.resolve(locale, param).to_string())
            .collect();
        format_template(template, &params)
    }
}

/// Substitutes printf-style placeholders.
///
/// Supports sequential `%s` / `%d`, indexed `%1$s` / `%1$d` (1-based) and
/// `%%`. Placeholders without a matching parameter are left as written.
pub fn format_template(template: &str, params: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let spec = &rest[pos + 1..];

        if let Some(after) = spec.strip_prefix('%') {
            out.push('%');
            rest = after;
            continue;
        }

        if let Some(after) = spec.strip_prefix('s').or_else(|| spec.strip_prefix('d')) {
            match params.get(next) {
                Some(param) => out.push_str(param),
                None => out.push_str(&rest[pos..pos + 2]),
            }
            next += 1;
            rest = after;
            continue;
        }

        let digits = spec.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            let tail = &spec[digits..];
            if let Some(after) = tail.strip_prefix("$s").or_else(|| tail.strip_prefix("$d")) {
                let index: usize = spec[..digits].parse().unwrap_or(0);
                match index.checked_sub(1).and_then(|i| params.get(i)) {
                    Some(param) => out.push_str(param),
                    None => out.push_str(&rest[pos..pos + 1 + digits + 2]),
                }
                rest = after;
                continue;
            }
        }

        out.push('%');
        rest = spec;
    }

    out.push_str(rest);
    out
}

/// Removes `§x` colour/style codes.
pub fn strip_format_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
