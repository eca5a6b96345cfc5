//! Built-in template functions
//!
//! The grammar rejects calls to functions it does not know, so every helper a
//! template may call is registered here. The entries are never invoked: the
//! checker only cares about which fields a template touches.

/// Signature of a registered template function.
pub type TemplateFunc = fn();

fn nop() {}

/// Helpers defined by the rendering codebase. Extend when templates start using new ones.
const HELPER_FUNCS: &[(&str, TemplateFunc)] = &[
    ("Year", nop),
    ("Now", nop),
    ("Join", nop),
    ("valueOrEmptySlice", nop),
];

/// Functions built into the template language.
const BUILTIN_FUNCS: &[(&str, TemplateFunc)] = &[
    ("and", nop),
    ("call", nop),
    ("html", nop),
    ("index", nop),
    ("slice", nop),
    ("js", nop),
    ("len", nop),
    ("not", nop),
    ("or", nop),
    ("print", nop),
    ("printf", nop),
    ("println", nop),
    ("urlquery", nop),
    ("eq", nop),
    ("ge", nop),
    ("gt", nop),
    ("le", nop),
    ("lt", nop),
    ("ne", nop),
];

/// The direct-index helper: `index <field> <integer>`.
pub const INDEX_FUNC: &str = "index";

/// One-argument helpers that hand their argument back unchanged when used as a range target.
pub const PASSTHROUGH_FUNCS: &[&str] = &["valueOrEmptySlice"];

/// Look up a registered function by name.
pub fn lookup(name: &str) -> Option<TemplateFunc> {
    HELPER_FUNCS
        .iter()
        .chain(BUILTIN_FUNCS)
        .find(|(registered, _)| *registered == name)
        .map(|(_, func)| *func)
}

pub fn is_defined(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn is_passthrough(name: &str) -> bool {
    PASSTHROUGH_FUNCS.contains(&name)
}

/// All registered names, helpers first.
pub fn names() -> impl Iterator<Item = &'static str> {
    HELPER_FUNCS.iter().chain(BUILTIN_FUNCS).map(|(name, _)| *name)
}
