use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

const DEFINE_FLAG_PREFIX: &str = "-D";

/// A configuration macro value as written in a header or build flag.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroValue {
    Int(i64),
    Float(f64),
    Str(String),
    /// `#define NAME` with no value, or a bare `-DNAME` flag.
    Defined,
}

impl MacroValue {
    // Coercion order is fixed: integer, then float, then trimmed string.
    pub fn coerce(raw: &str) -> MacroValue {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return MacroValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return MacroValue::Float(f);
        }
        MacroValue::Str(trimmed.to_string())
    }
}

fn define_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#define\s+(\w+)(?:\s+(.+))?$").expect("define pattern is valid")
    })
}

/// Extracts `#define NAME [VALUE]` entries from a header file.
///
/// `//` starts a same-line comment; lines that do not match the define shape
/// are skipped without comment. A missing file yields an empty mapping and a
/// warning, since the user-level header is optional.
pub fn extract_defines(path: &Path) -> BTreeMap<String, MacroValue> {
    let mut macros = BTreeMap::new();
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            println!("WARN: config header {} not found", path.display());
            return macros;
        }
    };

    for line in text.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = define_re().captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let value = match caps.get(2) {
            Some(rest) => MacroValue::coerce(rest.as_str()),
            None => MacroValue::Defined,
        };
        macros.insert(name, value);
    }
    macros
}

// `-DNAME` or `-DNAME=VALUE`; the value stays a raw string (no coercion).
// Tokens without the define prefix belong to the compiler, not to us.
fn parse_define_flags(tokens: &[String]) -> BTreeMap<String, MacroValue> {
    let mut macros = BTreeMap::new();
    for token in tokens {
        let Some(body) = token.strip_prefix(DEFINE_FLAG_PREFIX) else {
            continue;
        };
        match body.split_once('=') {
            Some((name, value)) => {
                macros.insert(name.trim().to_string(), MacroValue::Str(value.trim().into()));
            }
            None => {
                macros.insert(body.trim().to_string(), MacroValue::Defined);
            }
        }
    }
    macros
}

/// The merged macro mapping a build invocation evaluates conditions against.
#[derive(Debug, Clone, Default)]
pub struct MacroStore {
    map: BTreeMap<String, MacroValue>,
}

impl MacroStore {
    /// Layered union; later layers overwrite same-named keys from earlier
    /// ones. Precedence is fixed: system header, then user header, then
    /// build flags.
    pub fn merge(
        system: BTreeMap<String, MacroValue>,
        user: BTreeMap<String, MacroValue>,
        flag_tokens: &[String],
    ) -> MacroStore {
        let mut map = system;
        map.extend(user);
        map.extend(parse_define_flags(flag_tokens));
        MacroStore { map }
    }

    /// Reads both header layers and merges the build flags on top. A missing
    /// header warns inside `extract_defines` and contributes nothing, which
    /// is the expected case for the optional user header.
    pub fn load(system_path: &Path, user_path: &Path, flag_tokens: &[String]) -> MacroStore {
        let system = extract_defines(system_path);
        let user = extract_defines(user_path);
        Self::merge(system, user, flag_tokens)
    }

    pub fn get(&self, name: &str) -> Option<&MacroValue> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MacroValue)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
impl<const N: usize> From<[(&str, MacroValue); N]> for MacroStore {
    fn from(entries: [(&str, MacroValue); N]) -> Self {
        MacroStore {
            map: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_header(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn coercion_order_is_int_float_string() {
        assert_eq!(MacroValue::coerce("5"), MacroValue::Int(5));
        assert_eq!(MacroValue::coerce("-3"), MacroValue::Int(-3));
        assert_eq!(MacroValue::coerce("5.5"), MacroValue::Float(5.5));
        assert_eq!(MacroValue::coerce("  foo "), MacroValue::Str("foo".into()));
    }

    #[test]
    fn extract_handles_comments_and_bare_defines() {
        let temp = tempdir().unwrap();
        let path = write_header(
            temp.path(),
            "config.system.h",
            "// header comment\n\
             #define USE_CLOCK_CUSTOM 3 // pick a face\n\
             #define WIFI_SSID MyNetwork\n\
             #define FEATURE_FLAG\n\
             #define  \n\
             not a define\n",
        );

        let macros = extract_defines(&path);
        assert_eq!(macros.get("USE_CLOCK_CUSTOM"), Some(&MacroValue::Int(3)));
        assert_eq!(
            macros.get("WIFI_SSID"),
            Some(&MacroValue::Str("MyNetwork".into()))
        );
        assert_eq!(macros.get("FEATURE_FLAG"), Some(&MacroValue::Defined));
        assert_eq!(macros.len(), 3);
    }

    #[test]
    fn extract_warns_and_returns_empty_for_missing_file() {
        let temp = tempdir().unwrap();
        let macros = extract_defines(&temp.path().join("nope.h"));
        assert!(macros.is_empty());
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let system = BTreeMap::from([("A".to_string(), MacroValue::Int(1))]);
        let user = BTreeMap::from([("A".to_string(), MacroValue::Int(2))]);
        let store = MacroStore::merge(system, user, &[]);
        assert_eq!(store.get("A"), Some(&MacroValue::Int(2)));

        let system = BTreeMap::from([("A".to_string(), MacroValue::Int(1))]);
        let store = MacroStore::merge(system, BTreeMap::new(), &["-DA=3".to_string()]);
        // Flag values stay raw strings.
        assert_eq!(store.get("A"), Some(&MacroValue::Str("3".into())));
    }

    #[test]
    fn flag_tokens_without_define_prefix_are_ignored() {
        let tokens = vec![
            "-Wall".to_string(),
            "-DMODE=fast=yes".to_string(),
            "-DBARE".to_string(),
        ];
        let store = MacroStore::merge(BTreeMap::new(), BTreeMap::new(), &tokens);
        assert_eq!(store.len(), 2);
        // Split happens on the first '=' only.
        assert_eq!(store.get("MODE"), Some(&MacroValue::Str("fast=yes".into())));
        assert_eq!(store.get("BARE"), Some(&MacroValue::Defined));
        assert!(!store.contains("Wall"));
    }
}
