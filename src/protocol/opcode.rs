//! Opcode table
//!
//! Every opcode plus the metadata both the server and the proxy consult:
//! quietness, broadcast scope, and the non-quiet form.

use std::fmt;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    GetK = 0x0C,
    GetKQ = 0x0D,
    Append = 0x0E,
    Prepend = 0x0F,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1A,
}

impl Opcode {
    /// Every known opcode, in wire order
    pub const ALL: [Opcode; 27] = [
        Opcode::Get,
        Opcode::Set,
        Opcode::Add,
        Opcode::Replace,
        Opcode::Delete,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::Quit,
        Opcode::Flush,
        Opcode::GetQ,
        Opcode::Noop,
        Opcode::Version,
        Opcode::GetK,
        Opcode::GetKQ,
        Opcode::Append,
        Opcode::Prepend,
        Opcode::Stat,
        Opcode::SetQ,
        Opcode::AddQ,
        Opcode::ReplaceQ,
        Opcode::DeleteQ,
        Opcode::IncrementQ,
        Opcode::DecrementQ,
        Opcode::QuitQ,
        Opcode::FlushQ,
        Opcode::AppendQ,
        Opcode::PrependQ,
    ];

    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Quiet opcodes never get a response on their "uninteresting" outcome
    pub fn is_quiet(self) -> bool {
        matches!(
            self,
            Opcode::GetQ
                | Opcode::GetKQ
                | Opcode::SetQ
                | Opcode::AddQ
                | Opcode::ReplaceQ
                | Opcode::DeleteQ
                | Opcode::IncrementQ
                | Opcode::DecrementQ
                | Opcode::QuitQ
                | Opcode::FlushQ
                | Opcode::AppendQ
                | Opcode::PrependQ
        )
    }

    /// Opcodes that concern every shard rather than one key
    pub fn is_broadcast(self) -> bool {
        matches!(
            self,
            Opcode::Flush | Opcode::Noop | Opcode::Stat | Opcode::FlushQ
        )
    }

    /// Quiet mutations whose success response is dropped
    ///
    /// Quiet GETs are absent on purpose: their hits are always answered.
    pub fn suppresses_success(self) -> bool {
        matches!(
            self,
            Opcode::SetQ
                | Opcode::AddQ
                | Opcode::ReplaceQ
                | Opcode::DeleteQ
                | Opcode::IncrementQ
                | Opcode::DecrementQ
                | Opcode::AppendQ
                | Opcode::PrependQ
        )
    }

    /// The non-quiet form, used when an error must still be reported
    pub fn sync_form(self) -> Opcode {
        match self {
            Opcode::GetQ => Opcode::Get,
            Opcode::GetKQ => Opcode::GetK,
            Opcode::SetQ => Opcode::Set,
            Opcode::AddQ => Opcode::Add,
            Opcode::ReplaceQ => Opcode::Replace,
            Opcode::DeleteQ => Opcode::Delete,
            Opcode::IncrementQ => Opcode::Increment,
            Opcode::DecrementQ => Opcode::Decrement,
            Opcode::AppendQ => Opcode::Append,
            Opcode::PrependQ => Opcode::Prepend,
            other => other,
        }
    }

    /// GET variants that echo the key back
    pub fn returns_key(self) -> bool {
        matches!(self, Opcode::GetK | Opcode::GetKQ)
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Get => "GET",
            Opcode::Set => "SET",
            Opcode::Add => "ADD",
            Opcode::Replace => "REPLACE",
            Opcode::Delete => "DELETE",
            Opcode::Increment => "INCREMENT",
            Opcode::Decrement => "DECREMENT",
            Opcode::Quit => "QUIT",
            Opcode::Flush => "FLUSH",
            Opcode::GetQ => "GETQ",
            Opcode::Noop => "NOOP",
            Opcode::Version => "VERSION",
            Opcode::GetK => "GETK",
            Opcode::GetKQ => "GETKQ",
            Opcode::Append => "APPEND",
            Opcode::Prepend => "PREPEND",
            Opcode::Stat => "STAT",
            Opcode::SetQ => "SETQ",
            Opcode::AddQ => "ADDQ",
            Opcode::ReplaceQ => "REPLACEQ",
            Opcode::DeleteQ => "DELETEQ",
            Opcode::IncrementQ => "INCREMENTQ",
            Opcode::DecrementQ => "DECREMENTQ",
            Opcode::QuitQ => "QUITQ",
            Opcode::FlushQ => "FLUSHQ",
            Opcode::AppendQ => "APPENDQ",
            Opcode::PrependQ => "PREPENDQ",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Printable name for a raw opcode byte, known or not
pub fn opcode_name(byte: u8) -> String {
    match Opcode::from_u8(byte) {
        Some(op) => op.name().to_string(),
        None => format!("UNKNOWN(0x{:02x})", byte),
    }
}
