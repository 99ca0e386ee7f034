use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of routines and fields inside an artifact
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct MemberName(Cow<'static, str>);

/// Names of artifacts, written with `/` separated segments (eg. `scripts/hello`)
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct ArtifactName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for MemberName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for MemberName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!("Member name '{}' contains an illegal character", name))
        } else if name.is_empty() {
            Err(format!("Member name '{}' is empty", name))
        } else if (name.contains('<') || name.contains('>')) && name != "<init>" {
            Err(format!("Member name '{}' uses reserved angle brackets", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(MemberName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for ArtifactName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Artifact name '{}' is empty", name))
        } else {
            name.split('/').map(MemberName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(ArtifactName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for MemberName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for MemberName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for ArtifactName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl MemberName {
    /// Concatenate the contents of two member names to produce a third
    pub fn concat(&self, other: &MemberName) -> MemberName {
        MemberName(Cow::Owned(format!("{}{}", self.as_str(), other.as_str())))
    }

    /// Name made of a prefix followed by a counter value (eg. `symbol3`)
    pub fn numbered(prefix: &str, n: usize) -> MemberName {
        MemberName(Cow::Owned(format!("{}{}", prefix, n)))
    }

    /// Name of a generated routine for some source-level construct
    ///
    /// Generated routine names have the shape `{kind}{counter}$RUBY${mangled}`, so that the
    /// counter keeps independently generated routines distinct and the suffix still reveals the
    /// source-level name in backtraces.
    pub fn generated(kind: &str, n: usize, source_name: &str) -> MemberName {
        MemberName(Cow::Owned(format!(
            "{}{}$RUBY${}",
            kind,
            n,
            mangle(source_name)
        )))
    }

    /// Source-level name embedded in a generated routine name, if there is one
    pub fn source_name(&self) -> Option<String> {
        let (_, mangled) = self.as_str().split_once("$RUBY$")?;
        let mangled = mangled.strip_suffix("$boxed").unwrap_or(mangled);
        Some(demangle(mangled))
    }

    const fn name(value: &'static str) -> MemberName {
        MemberName(Cow::Borrowed(value))
    }

    // Special member names - only this one is allowed to have angle brackets in it
    pub const INIT: Self = Self::name("<init>");

    // Scaffolding routines
    pub const LOAD: Self = Self::name("load");
    pub const FILE: Self = Self::name("__file__");
    pub const BOXED_SUFFIX: Self = Self::name("$boxed");
}

const ESCAPES: [(char, &str); 17] = [
    ('?', "p"),
    ('!', "b"),
    ('=', "eq"),
    ('<', "lt"),
    ('>', "gt"),
    ('+', "plus"),
    ('-', "minus"),
    ('*', "times"),
    ('/', "slash"),
    ('%', "percent"),
    ('[', "lbrack"),
    (']', "rbrack"),
    ('~', "tilde"),
    ('^', "caret"),
    ('&', "amp"),
    ('|', "pipe"),
    ('@', "at"),
];

/// Make a source-level method name safe to embed in a member name
///
/// Alphanumeric characters and `_` are kept as is. Operator characters become `$` followed by
/// a short mnemonic and a trailing `$`, anything else becomes `$x{code point in hex}$`.
pub fn mangle(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            mangled.push(c);
        } else if let Some((_, escape)) = ESCAPES.iter().find(|(from, _)| *from == c) {
            mangled.push('$');
            mangled.push_str(escape);
            mangled.push('$');
        } else {
            mangled.push_str(&format!("$x{:x}$", c as u32));
        }
    }
    mangled
}

/// Inverse of [`mangle`]
pub fn demangle(mangled: &str) -> String {
    let mut name = String::with_capacity(mangled.len());
    let mut rest = mangled;
    while let Some(start) = rest.find('$') {
        name.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('$') {
            Some(end) => {
                let escape = &after[..end];
                if let Some((c, _)) = ESCAPES.iter().find(|(_, e)| *e == escape) {
                    name.push(*c);
                } else if let Some(c) = escape
                    .strip_prefix('x')
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32)
                {
                    name.push(c);
                } else {
                    name.push('$');
                    name.push_str(escape);
                    name.push('$');
                }
                rest = &after[end + 1..];
            }
            None => {
                name.push('$');
                rest = after;
            }
        }
    }
    name.push_str(rest);
    name
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mangling_operators() {
        assert_eq!(mangle("foo"), "foo");
        assert_eq!(mangle("empty?"), "empty$p$");
        assert_eq!(mangle("[]="), "$lbrack$$rbrack$$eq$");
        assert_eq!(mangle("<=>"), "$lt$$eq$$gt$");
        assert_eq!(mangle("caf\u{e9}"), "caf$xe9$");

        for name in ["foo", "empty?", "[]=", "<=>", "save!", "caf\u{e9}", "+@"] {
            assert_eq!(demangle(&mangle(name)), name);
        }
    }

    #[test]
    fn generated_names() {
        let name = MemberName::generated("method__", 3, "[]=");
        assert_eq!(name.as_str(), "method__3$RUBY$$lbrack$$rbrack$$eq$");
        assert_eq!(name.source_name().as_deref(), Some("[]="));
        assert!(MemberName::check_valid(name.as_str()).is_ok());
        assert!(MemberName::check_valid("a.b").is_err());
        assert!(MemberName::check_valid("<clinit>").is_err());
        assert!(MemberName::check_valid("<init>").is_ok());
    }
}
