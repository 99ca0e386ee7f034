use super::CallType;

/// Link-time constants baked into a dynamically linked call site
///
/// The runtime resolves the bootstrap the first time the site runs and binds the result to the
/// site. Constant sites are additionally bound to a switch point for the constant's name, so
/// redefining the constant forces re-resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Bootstrap {
    Fixnum(i64),
    Float(f64),
    Bignum(String),
    Symbol(String),
    Str(String),
    Regexp { pattern: String, options: i64 },
    Constant(String),
    CallSite { name: String, call_type: CallType },
    StaticScope(String),
    BlockBody(usize),
}
