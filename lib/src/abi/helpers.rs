use crate::vm::{Signature, SlotType};

/// Runtime services callable from generated code
///
/// Generated code never reimplements these: it pushes the arguments and invokes the helper. The
/// signature of each helper is fixed, so the stack effect of a call is known statically.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RuntimeHelper {
    /// `nil` for the runtime of the context
    GetNil,
    GetTrue,
    GetFalse,

    /// Truthiness of a language-level value (everything except `nil` and `false`)
    IsTrue,

    /// Language-level boolean from a host boolean
    NewBoolean,

    NewFixnum,
    NewFloat,

    /// Arbitrary precision integer from its decimal representation
    NewBignum,
    NewSymbol,

    /// Frozen string used as the prototype for a string literal
    NewFrozenString,

    /// Fresh, mutable copy of a string
    StrDup,
    NewString,

    /// Append the `to_s` of a value to a string (returning the string)
    AppendAsString,

    /// Symbol from the string form of a value
    ToSymbol,

    NewRegexp,
    RegexpFromString,

    /// Language-level array wrapping a host array
    NewArray,

    /// Language-level array from a fixed number of stack values
    ConstructArray(u8),
    ArrayAppend,

    /// Concatenate the splatted form of a value onto an array
    ArrayConcat,

    /// Array form of a splatted value
    SplatValue,
    ToHostArray,

    NewHash,

    /// Store a key-value pair into a hash, returning the hash
    HashStore,

    /// Language-level hash from a fixed number of key-value pairs on the stack
    ConstructHash(u8),
    NewRange,

    /// Array to destructure in a multiple assignment
    EnsureArray,
    ArrayEntryOrNil,
    SubarrayOrEmpty,

    /// Raise an arity fault unless `min <= args.len() <= max` (`max < 0` for unbounded)
    CheckArity,
    HostEntryOrNil,
    HostSubarray,

    /// Proc for a block argument (`&blk`), or `nil`
    BlockToProc,

    /// Normalize the values passed to a block (auto-splat of a single array argument)
    PrepareBlockArgs,

    GetCurrentScope,
    ScopeValues,

    /// Fast path for reading one of the first four variables of a scope
    GetValueDepthZero(u8),

    /// Fast path for writing one of the first four variables of a scope
    SetValueDepthZero(u8),

    /// Read a variable `depth` scopes up
    GetValue,

    /// Write a variable `depth` scopes up
    SetValue,

    /// Current `$!`
    GetErrorInfo,
    SetErrorInfo,
    StoreExceptionInErrorInfo,

    /// Does a raised signal match one of the given exception classes?
    IsExceptionHandled,
    GetStandardError,

    BreakJump,
    NextJump,
    RedoJump,
    RetryJump,
    ReturnJump,

    /// Value carried by a break/next signal
    SignalValue,
    PollThreadEvents,

    PrepareSuperClass,
    PrepareClassNamespace,
    DefineClassUnder,
    DefineModuleUnder,
    GetSingletonClass,

    /// Enter a class body: push a frame (and possibly a scope) with the class as `self`
    PreCompiledClass,
    PostCompiledClass,

    /// Define a method from a descriptor of the artifact
    Def,

    /// Define a singleton method from a descriptor of the artifact
    Defs,
    Alias,
    Undef,

    NewStaticScope,

    NewBlockBody,
    CreateBlock,
    CreateSharedScopeBlock,
    NewLambda,

    /// Block of the method frame (from inside a closure)
    GetFrameBlock,

    /// Block for a `&value` argument
    ProcToBlock,
    RunBeginBlock,
    RegisterEndBlock,

    NewCallSite,

    /// Call through a call site with a fixed number of arguments
    Call(u8),

    /// Call through a call site with a host array of arguments
    CallBoxed,
    CallSuper,

    /// Arguments of the current method, for an argument-less `super`
    ZSuperArgs,
    Yield,

    GetInstanceVariable,
    SetInstanceVariable,
    GetGlobal,
    SetGlobal,
    GetClassVariable,
    SetClassVariable,

    /// Uncached lexical constant lookup
    GetConstant,

    /// Global constant generation, bumped whenever any constant is (re)defined
    ConstantGeneration,
    GetConstantFrom,
    GetObjectClass,
    SetConstant,
    SetConstantIn,

    DefinedMethod,
    DefinedInstanceVariable,
    DefinedGlobal,
    DefinedConstant,
    DefinedConstantFrom,
    DefinedClassVariable,
    DefinedSuper,
    DefinedYield,

    /// One of the `$~ $& $\` $' $+` backrefs, selected by an integer
    Backref,
    NthRef,

    /// Does any element of a splatted `when` list match the subject?
    WhenSplat,

    PreLoad,
    PostLoad,
}

impl RuntimeHelper {
    /// Get the helper name
    pub const fn name(&self) -> &'static str {
        use RuntimeHelper::*;
        match self {
            GetNil => "getNil",
            GetTrue => "getTrue",
            GetFalse => "getFalse",
            IsTrue => "isTrue",
            NewBoolean => "newBoolean",
            NewFixnum => "newFixnum",
            NewFloat => "newFloat",
            NewBignum => "newBignum",
            NewSymbol => "newSymbol",
            NewFrozenString => "newFrozenString",
            StrDup => "strDup",
            NewString => "newString",
            AppendAsString => "appendAsString",
            ToSymbol => "toSymbol",
            NewRegexp => "newRegexp",
            RegexpFromString => "regexpFromString",
            NewArray => "newArray",
            ConstructArray(_) => "constructArray",
            ArrayAppend => "arrayAppend",
            ArrayConcat => "arrayConcat",
            SplatValue => "splatValue",
            ToHostArray => "toHostArray",
            NewHash => "newHash",
            HashStore => "hashStore",
            ConstructHash(_) => "constructHash",
            NewRange => "newRange",
            EnsureArray => "ensureMultipleAssignableArray",
            ArrayEntryOrNil => "arrayEntryOrNil",
            SubarrayOrEmpty => "subarrayOrEmpty",
            CheckArity => "checkArgumentCount",
            HostEntryOrNil => "hostEntryOrNil",
            HostSubarray => "hostSubarray",
            BlockToProc => "processBlockArgument",
            PrepareBlockArgs => "prepareBlockArgs",
            GetCurrentScope => "getCurrentScope",
            ScopeValues => "getValues",
            GetValueDepthZero(_) => "getValueDepthZero",
            SetValueDepthZero(_) => "setValueDepthZero",
            GetValue => "getValue",
            SetValue => "setValue",
            GetErrorInfo => "getErrorInfo",
            SetErrorInfo => "setErrorInfo",
            StoreExceptionInErrorInfo => "storeExceptionInErrorInfo",
            IsExceptionHandled => "isExceptionHandled",
            GetStandardError => "getStandardError",
            BreakJump => "breakJump",
            NextJump => "nextJump",
            RedoJump => "redoJump",
            RetryJump => "retryJump",
            ReturnJump => "returnJump",
            SignalValue => "signalValue",
            PollThreadEvents => "pollThreadEvents",
            PrepareSuperClass => "prepareSuperClass",
            PrepareClassNamespace => "prepareClassNamespace",
            DefineClassUnder => "defineOrGetClassUnder",
            DefineModuleUnder => "defineOrGetModuleUnder",
            GetSingletonClass => "getSingletonClass",
            PreCompiledClass => "preCompiledClass",
            PostCompiledClass => "postCompiledClass",
            Def => "def",
            Defs => "defs",
            Alias => "alias",
            Undef => "undef",
            NewStaticScope => "newStaticScope",
            NewBlockBody => "newBlockBody",
            CreateBlock => "createBlock",
            CreateSharedScopeBlock => "createSharedScopeBlock",
            NewLambda => "newLambda",
            GetFrameBlock => "getFrameBlock",
            ProcToBlock => "procToBlock",
            RunBeginBlock => "runBeginBlock",
            RegisterEndBlock => "registerEndBlock",
            NewCallSite => "newCallSite",
            Call(_) => "call",
            CallBoxed => "callBoxed",
            CallSuper => "callSuper",
            ZSuperArgs => "zsuperArgs",
            Yield => "yield",
            GetInstanceVariable => "getInstanceVariable",
            SetInstanceVariable => "setInstanceVariable",
            GetGlobal => "getGlobal",
            SetGlobal => "setGlobal",
            GetClassVariable => "getClassVariable",
            SetClassVariable => "setClassVariable",
            GetConstant => "getConstant",
            ConstantGeneration => "constantGeneration",
            GetConstantFrom => "getConstantFrom",
            GetObjectClass => "getObjectClass",
            SetConstant => "setConstant",
            SetConstantIn => "setConstantIn",
            DefinedMethod => "definedMethod",
            DefinedInstanceVariable => "definedInstanceVariable",
            DefinedGlobal => "definedGlobal",
            DefinedConstant => "definedConstant",
            DefinedConstantFrom => "definedConstantFrom",
            DefinedClassVariable => "definedClassVariable",
            DefinedSuper => "definedSuper",
            DefinedYield => "definedYield",
            Backref => "backref",
            NthRef => "nthRef",
            WhenSplat => "whenSplat",
            PreLoad => "preLoad",
            PostLoad => "postLoad",
        }
    }

    /// Get the helper signature
    pub fn signature(&self) -> Signature {
        use RuntimeHelper::*;
        use SlotType::{
            Artifact as A, Block as B, BlockBody as Y, Bool as Z, CallSite as L, Context as C,
            Float as D, Int as I, Object as O, Objects as H, Scope as E, Signal as X,
            StaticScope as Q, Str as S,
        };

        fn sig(parameters: &[SlotType], return_type: Option<SlotType>) -> Signature {
            Signature::new(parameters.to_vec(), return_type)
        }

        match self {
            GetNil | GetTrue | GetFalse | GetStandardError | GetObjectClass | GetErrorInfo
            | DefinedSuper => sig(&[C], Some(O)),
            IsTrue => sig(&[O], Some(Z)),
            NewBoolean => sig(&[C, Z], Some(O)),
            NewFixnum => sig(&[C, I], Some(O)),
            NewFloat => sig(&[C, D], Some(O)),
            NewBignum | NewSymbol | NewFrozenString | NewString | GetGlobal | GetClassVariable
            | GetConstant | DefinedGlobal | DefinedConstant | DefinedClassVariable | Undef => {
                sig(&[C, S], Some(O))
            }
            StrDup | ToSymbol | SplatValue | EnsureArray | PrepareSuperClass
            | PrepareClassNamespace | GetSingletonClass => sig(&[C, O], Some(O)),
            AppendAsString | ArrayAppend | ArrayConcat => sig(&[C, O, O], Some(O)),
            NewRegexp => sig(&[C, S, I], Some(O)),
            RegexpFromString | ArrayEntryOrNil | SubarrayOrEmpty => sig(&[C, O, I], Some(O)),
            NewArray => sig(&[C, H], Some(O)),
            ConstructArray(n) => {
                let mut params = vec![C];
                params.extend((0..*n).map(|_| O));
                Signature::new(params, Some(O))
            }
            ToHostArray => sig(&[C, O], Some(H)),
            NewHash => sig(&[C], Some(O)),
            HashStore => sig(&[C, O, O, O], Some(O)),
            ConstructHash(n) => {
                let mut params = vec![C];
                params.extend((0..(2 * *n)).map(|_| O));
                Signature::new(params, Some(O))
            }
            NewRange => sig(&[C, O, O, Z], Some(O)),
            CheckArity => sig(&[C, H, I, I], None),
            HostEntryOrNil | HostSubarray => sig(&[C, H, I], Some(O)),
            BlockToProc => sig(&[C, B], Some(O)),
            PrepareBlockArgs => sig(&[C, H, I, Z], Some(H)),
            GetCurrentScope => sig(&[C], Some(E)),
            ScopeValues => sig(&[E], Some(H)),
            GetValueDepthZero(_) => sig(&[E], Some(O)),
            SetValueDepthZero(_) => sig(&[E, O], None),
            GetValue => sig(&[E, I, I], Some(O)),
            SetValue => sig(&[E, O, I, I], None),
            SetErrorInfo => sig(&[C, O], None),
            StoreExceptionInErrorInfo => sig(&[X, C], None),
            IsExceptionHandled => sig(&[C, X, H], Some(Z)),
            BreakJump | NextJump | ReturnJump => sig(&[C, O], Some(X)),
            RedoJump | RetryJump => sig(&[C], Some(X)),
            SignalValue => sig(&[X], Some(O)),
            PollThreadEvents | PostCompiledClass | PostLoad => sig(&[C], None),
            DefineClassUnder => sig(&[C, O, S, O], Some(O)),
            DefineModuleUnder | GetInstanceVariable | GetConstantFrom | DefinedInstanceVariable
            | DefinedConstantFrom => sig(&[C, O, S], Some(O)),
            PreCompiledClass => sig(&[C, O, Q, Z], None),
            Def | Defs => sig(&[C, O, A, I], Some(O)),
            Alias => sig(&[C, S, S], Some(O)),
            NewStaticScope => sig(&[C, S], Some(Q)),
            NewBlockBody => sig(&[C, A, I], Some(Y)),
            CreateBlock | CreateSharedScopeBlock => sig(&[C, O, Y], Some(B)),
            NewLambda | RunBeginBlock | DefinedYield => sig(&[C, B], Some(O)),
            GetFrameBlock => sig(&[C], Some(B)),
            ProcToBlock => sig(&[C, O], Some(B)),
            RegisterEndBlock => sig(&[C, B], None),
            NewCallSite => sig(&[C, S, I], Some(L)),
            Call(n) => {
                let mut params = vec![L, C, O, O];
                params.extend((0..*n).map(|_| O));
                params.push(B);
                Signature::new(params, Some(O))
            }
            CallBoxed => sig(&[L, C, O, O, H, B], Some(O)),
            CallSuper => sig(&[C, O, H, B], Some(O)),
            ZSuperArgs => sig(&[C], Some(H)),
            Yield => sig(&[C, B, O, Z], Some(O)),
            SetInstanceVariable => sig(&[C, O, O, S], Some(O)),
            SetGlobal | SetClassVariable | SetConstant => sig(&[C, O, S], Some(O)),
            ConstantGeneration => sig(&[C], Some(I)),
            SetConstantIn => sig(&[C, O, O, S], Some(O)),
            DefinedMethod => sig(&[C, O, S, Z], Some(O)),
            Backref | NthRef => sig(&[C, I], Some(O)),
            WhenSplat => sig(&[C, O, O], Some(Z)),
            PreLoad => sig(&[C, Q], None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specific_arity_signatures() {
        assert_eq!(RuntimeHelper::Call(0).signature().render(), "(LCOOB)O");
        assert_eq!(RuntimeHelper::Call(2).signature().render(), "(LCOOOOB)O");
        assert_eq!(RuntimeHelper::ConstructArray(3).signature().render(), "(COOO)O");
        assert_eq!(RuntimeHelper::ConstructHash(2).signature().render(), "(COOOO)O");
        assert_eq!(RuntimeHelper::CheckArity.signature().render(), "(C[II)V");
    }
}
