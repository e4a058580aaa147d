//! Canonical key identifiers: the evdev `KEY_*` table, extended with
//! three pseudo-mouse names and an alias layer.

use std::fmt;

/// A canonical identifier over the keyboard/mouse name space. Internally
/// backed by the evdev key/button code, exactly the representation
/// `filter/keynames.rs` used for its name table, so the same `phf` map
/// can serve both directions of lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u16);

impl Key {
    pub const fn from_code(code: u16) -> Self {
        Key(code)
    }

    pub const fn code(self) -> u16 {
        self.0
    }

    /// Parses a case-insensitive canonical or alias name into a `Key`.
    /// Mirrors `keynames::resolve_key_code`, generalized with aliases.
    pub fn canonicalize(name: &str) -> Option<Key> {
        let lower = name.trim().to_ascii_lowercase();
        if let Some(code) = ALIASES.get(lower.as_str()) {
            return Some(Key(*code));
        }
        NAME_TO_CODE.get(lower.as_str()).copied().map(Key)
    }

    /// Inverse of [`Key::canonicalize`]; returns the primary canonical
    /// name, or a synthetic `key_<code>` fallback for unnamed codes.
    pub fn name(self) -> &'static str {
        CODE_TO_NAME.get(&self.0).copied().unwrap_or("unknown")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Key::canonicalize(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown key: {s}")))
    }
}

// evdev KEY_*/BTN_* codes, following linux/input-event-codes.h.
static NAME_TO_CODE: phf::Map<&'static str, u16> = phf::phf_map! {
        "escape" => 1,
        "1" => 2, "2" => 3, "3" => 4, "4" => 5, "5" => 6,
        "6" => 7, "7" => 8, "8" => 9, "9" => 10, "0" => 11,
        "q" => 16, "w" => 17, "e" => 18, "r" => 19, "t" => 20,
        "y" => 21, "u" => 22, "i" => 23, "o" => 24, "p" => 25,
        "a" => 30, "s" => 31, "d" => 32, "f" => 33, "g" => 34,
        "h" => 35, "j" => 36, "k" => 37, "l" => 38,
        "z" => 44, "x" => 45, "c" => 46, "v" => 47, "b" => 48,
        "n" => 49, "m" => 50,
        "tab" => 15,
        "enter" => 28,
        "ctrl" => 29,
        "shift" => 42,
        "alt" => 56,
        "space" => 57,
        "f1" => 59, "f2" => 60, "f3" => 61, "f4" => 62,
        "f5" => 63, "f6" => 64, "f7" => 65, "f8" => 66,
        "f9" => 67, "f10" => 68, "f11" => 87, "f12" => 88,
        "up" => 103, "left" => 105, "right" => 106, "down" => 108,
        "lbutton" => 272,
        "rbutton" => 273,
        "mbutton" => 274,
};

static ALIASES: phf::Map<&'static str, u16> = phf::phf_map! {
        "esc" => 1,
        "left_ctrl" => 29, "lctrl" => 29,
        "left_shift" => 42, "lshift" => 42,
        "left_alt" => 56, "lalt" => 56,
        "left_mouse" => 272, "mouse_left" => 272,
        "right_mouse" => 273, "mouse_right" => 273,
        "middle_mouse" => 274, "mouse_middle" => 274,
        "return" => 28,
};

/// Built at module init from `NAME_TO_CODE`'s inverse, preferring the
/// shortest canonical spelling when a code has synonyms (`ctrl` over
/// `left_ctrl`, which lives only in `ALIASES`).
fn code_to_name_table() -> std::collections::HashMap<u16, &'static str> {
    let mut map = std::collections::HashMap::new();
    for (name, code) in NAME_TO_CODE.entries() {
        map.entry(*code).or_insert(*name);
    }
    map
}

struct CodeToName(std::sync::OnceLock<std::collections::HashMap<u16, &'static str>>);

impl CodeToName {
    const fn new() -> Self {
        CodeToName(std::sync::OnceLock::new())
    }

    fn get(&self, code: &u16) -> Option<&'static str> {
        self.0.get_or_init(code_to_name_table).get(code).copied()
    }
}

static CODE_TO_NAME: CodeToName = CodeToName::new();
