use std::fmt::{Display, Formatter};

use crate::types::Revnum;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
/// One token of the `ra_svn` wire protocol.
pub enum SvnItem {
    Word(String),
    Number(u64),
    /// Raw bytes; may not be valid UTF-8.
    String(Vec<u8>),
    List(Vec<SvnItem>),
    /// Booleans travel as the words `true`/`false`.
    Bool(bool),
}

impl SvnItem {
    pub(crate) fn word(word: &str) -> Self {
        SvnItem::Word(word.to_string())
    }

    pub(crate) fn string(s: impl AsRef<[u8]>) -> Self {
        SvnItem::String(s.as_ref().to_vec())
    }

    /// `( rev )` for a valid revision, `( )` otherwise.
    pub(crate) fn opt_revision(rev: Option<Revnum>) -> Self {
        match rev.and_then(|rev| u64::try_from(rev).ok()) {
            Some(rev) => SvnItem::List(vec![SvnItem::Number(rev)]),
            None => SvnItem::List(Vec::new()),
        }
    }

    /// `( string )` or `( )`.
    pub(crate) fn opt_string(s: Option<impl AsRef<[u8]>>) -> Self {
        match s {
            Some(s) => SvnItem::List(vec![SvnItem::string(s)]),
            None => SvnItem::List(Vec::new()),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            SvnItem::Word(_) => "word",
            SvnItem::Number(_) => "number",
            SvnItem::String(_) => "string",
            SvnItem::List(_) => "list",
            SvnItem::Bool(_) => "bool",
        }
    }

    pub fn as_word(&self) -> Option<&str> {
        match self {
            SvnItem::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SvnItem::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as a revision, if it fits.
    pub fn as_revnum(&self) -> Option<Revnum> {
        self.as_u64().and_then(|n| Revnum::try_from(n).ok())
    }

    /// Accepts a boolean or one of the words `true`/`false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SvnItem::Bool(b) => Some(*b),
            SvnItem::Word(w) if w == "true" => Some(true),
            SvnItem::Word(w) if w == "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SvnItem::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The string lossily decoded as UTF-8.
    pub fn as_string(&self) -> Option<String> {
        self.as_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_list(&self) -> Option<&[SvnItem]> {
        match self {
            SvnItem::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Display for SvnItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SvnItem::Word(w) => write!(f, "{w}"),
            SvnItem::Number(n) => write!(f, "{n}"),
            SvnItem::String(s) => write!(f, "<{} bytes>", s.len()),
            SvnItem::List(items) => write!(f, "({} items)", items.len()),
            SvnItem::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Appends the wire form of `item`, followed by a space.
pub(crate) fn encode_item(item: &SvnItem, out: &mut Vec<u8>) {
    match item {
        SvnItem::Word(w) => {
            out.extend_from_slice(w.as_bytes());
            out.push(b' ');
        }
        SvnItem::Number(n) => {
            encode_decimal(*n, out);
            out.push(b' ');
        }
        SvnItem::Bool(true) => out.extend_from_slice(b"true "),
        SvnItem::Bool(false) => out.extend_from_slice(b"false "),
        SvnItem::String(bytes) => {
            encode_decimal(bytes.len() as u64, out);
            out.push(b':');
            out.extend_from_slice(bytes);
            out.push(b' ');
        }
        SvnItem::List(items) => {
            out.extend_from_slice(b"( ");
            for item in items {
                encode_item(item, out);
            }
            out.extend_from_slice(b") ");
        }
    }
}

/// `( command ( params... ) ) `
pub(crate) fn encode_command(command: &str, params: &SvnItem, out: &mut Vec<u8>) {
    out.extend_from_slice(b"( ");
    out.extend_from_slice(command.as_bytes());
    out.push(b' ');
    encode_item(params, out);
    out.extend_from_slice(b") ");
}

fn encode_decimal(mut n: u64, out: &mut Vec<u8>) {
    if n == 0 {
        out.push(b'0');
        return;
    }
    let mut buf = [0u8; 20];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }
    out.extend_from_slice(&buf[i..]);
}
