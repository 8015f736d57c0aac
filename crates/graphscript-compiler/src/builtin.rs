//! Builtin functions callable from the graph.
//!
//! The editing layer identifies a builtin by the node kind plus an optional
//! option text (list operations share one node kind and differ only in the
//! option). `Builtin::resolve` is the single lookup for that pairing.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// A builtin function the runtime library provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    NumToStr,
    StrToNum,
    RandomInt,
    Sleep,
    ListPush,
    ListGet,
    ListSet,
    ListRemove,
    ListLen,
    ListToStr,
    /// Compiles to its first argument; no call is emitted.
    Identity,
}

static BUILTIN_TABLE: Lazy<HashMap<(&'static str, Option<&'static str>), Builtin>> =
    Lazy::new(|| {
        HashMap::from([
            (("print", None), Builtin::Print),
            (("num-to-str", None), Builtin::NumToStr),
            (("str-to-num", None), Builtin::StrToNum),
            (("random-int", None), Builtin::RandomInt),
            (("sleep", None), Builtin::Sleep),
            (("list-op", Some("push")), Builtin::ListPush),
            (("list-op", Some("get")), Builtin::ListGet),
            (("list-op", Some("set")), Builtin::ListSet),
            (("list-op", Some("remove")), Builtin::ListRemove),
            (("list-op", Some("len")), Builtin::ListLen),
            (("list-op", Some("to-str")), Builtin::ListToStr),
            (("identity", None), Builtin::Identity),
        ])
    });

impl Builtin {
    /// Look up a builtin by node kind and option text.
    pub fn resolve(kind: &str, option: Option<&str>) -> Option<Builtin> {
        BUILTIN_TABLE.get(&(kind, option)).copied()
    }

    /// Name of the runtime library function implementing this builtin.
    pub fn runtime_name(self) -> &'static str {
        match self {
            Self::Print => "_print",
            Self::NumToStr => "_numToStr",
            Self::StrToNum => "_strToNum",
            Self::RandomInt => "_randomInt",
            Self::Sleep => "_sleep",
            Self::ListPush => "_pushToList",
            Self::ListGet => "_getFromList",
            Self::ListSet => "_setInList",
            Self::ListRemove => "_removeFromList",
            Self::ListLen => "_lenOfList",
            Self::ListToStr => "_listToStr",
            Self::Identity => "_identity",
        }
    }

    pub fn is_identity(self) -> bool {
        matches!(self, Self::Identity)
    }
}
