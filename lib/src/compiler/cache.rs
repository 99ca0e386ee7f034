use super::settings::DynamicLinkage;
use super::Error;
use crate::abi::{Bootstrap, CallType, RuntimeHelper, CONTEXT, THIS};
use crate::vm::{
    Artifact, BranchInstruction, CodeBuilder, CodeBuilderExts, Field, FieldAccessFlags,
    Instruction, MemberName, OrdComparison, Routine, RoutineAccessFlags, Signature, SlotType,
    Test,
};
use std::collections::HashMap;

/// Logical identity of a cached runtime value
///
/// Two equal keys always share one cache entry in an artifact. Constants and call sites are
/// keyed by source site as well as name, since lexical context (or call type) differs per site.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CacheKey {
    Symbol(String),
    Str(String),
    Fixnum(i64),

    /// Float literal, by bit pattern
    Float(u64),
    Bignum(String),
    Regexp { pattern: String, options: i64 },
    Constant { name: String, site: usize },
    CallSite {
        name: String,
        call_type: CallType,
        site: usize,
    },

    /// Static scope, by its encoded form
    StaticScope(String),

    /// Block body of the closure registered at this descriptor index
    BlockBody(usize),
}

impl CacheKey {
    /// Prefix used when naming the field and accessor of the entry
    fn kind(&self) -> &'static str {
        match self {
            CacheKey::Symbol(_) => "symbol",
            CacheKey::Str(_) => "string",
            CacheKey::Fixnum(_) => "fixnum",
            CacheKey::Float(_) => "float",
            CacheKey::Bignum(_) => "bignum",
            CacheKey::Regexp { .. } => "regexp",
            CacheKey::Constant { .. } => "constant",
            CacheKey::CallSite { .. } => "callsite",
            CacheKey::StaticScope(_) => "scope",
            CacheKey::BlockBody(_) => "blockbody",
        }
    }

    /// Type of the cached value
    pub fn slot_type(&self) -> SlotType {
        match self {
            CacheKey::CallSite { .. } => SlotType::CallSite,
            CacheKey::StaticScope(_) => SlotType::StaticScope,
            CacheKey::BlockBody(_) => SlotType::BlockBody,
            _ => SlotType::Object,
        }
    }

    fn dynamically_linked(&self, linkage: &DynamicLinkage) -> bool {
        match self {
            CacheKey::Symbol(_)
            | CacheKey::Str(_)
            | CacheKey::Fixnum(_)
            | CacheKey::Float(_)
            | CacheKey::Bignum(_) => linkage.literals,
            CacheKey::Regexp { .. } => linkage.regexps,
            CacheKey::Constant { .. } => linkage.constants,
            CacheKey::CallSite { .. } => linkage.call_sites,
            CacheKey::StaticScope(_) | CacheKey::BlockBody(_) => linkage.scopes,
        }
    }

    fn bootstrap(&self) -> Bootstrap {
        match self {
            CacheKey::Symbol(name) => Bootstrap::Symbol(name.clone()),
            CacheKey::Str(value) => Bootstrap::Str(value.clone()),
            CacheKey::Fixnum(value) => Bootstrap::Fixnum(*value),
            CacheKey::Float(bits) => Bootstrap::Float(f64::from_bits(*bits)),
            CacheKey::Bignum(digits) => Bootstrap::Bignum(digits.clone()),
            CacheKey::Regexp { pattern, options } => Bootstrap::Regexp {
                pattern: pattern.clone(),
                options: *options,
            },
            CacheKey::Constant { name, .. } => Bootstrap::Constant(name.clone()),
            CacheKey::CallSite {
                name, call_type, ..
            } => Bootstrap::CallSite {
                name: name.clone(),
                call_type: *call_type,
            },
            CacheKey::StaticScope(encoded) => Bootstrap::StaticScope(encoded.clone()),
            CacheKey::BlockBody(index) => Bootstrap::BlockBody(*index),
        }
    }

    /// Emit code constructing the value from scratch (inside an accessor)
    fn construct(&self, code: &mut CodeBuilder) -> Result<(), Error> {
        code.get_local(CONTEXT)?;
        match self {
            CacheKey::Symbol(name) => {
                code.const_string(name.as_str())?;
                code.invoke(RuntimeHelper::NewSymbol)?;
            }
            CacheKey::Str(value) => {
                code.const_string(value.as_str())?;
                code.invoke(RuntimeHelper::NewFrozenString)?;
            }
            CacheKey::Fixnum(value) => {
                code.const_int(*value)?;
                code.invoke(RuntimeHelper::NewFixnum)?;
            }
            CacheKey::Float(bits) => {
                code.const_float(f64::from_bits(*bits))?;
                code.invoke(RuntimeHelper::NewFloat)?;
            }
            CacheKey::Bignum(digits) => {
                code.const_string(digits.as_str())?;
                code.invoke(RuntimeHelper::NewBignum)?;
            }
            CacheKey::Regexp { pattern, options } => {
                code.const_string(pattern.as_str())?;
                code.const_int(*options)?;
                code.invoke(RuntimeHelper::NewRegexp)?;
            }
            CacheKey::Constant { name, .. } => {
                code.const_string(name.as_str())?;
                code.invoke(RuntimeHelper::GetConstant)?;
            }
            CacheKey::CallSite {
                name, call_type, ..
            } => {
                code.const_string(name.as_str())?;
                code.const_int(call_type.as_int())?;
                code.invoke(RuntimeHelper::NewCallSite)?;
            }
            CacheKey::StaticScope(encoded) => {
                code.const_string(encoded.as_str())?;
                code.invoke(RuntimeHelper::NewStaticScope)?;
            }
            CacheKey::BlockBody(index) => {
                code.get_local(THIS)?;
                code.const_int(*index as i64)?;
                code.invoke(RuntimeHelper::NewBlockBody)?;
            }
        }
        Ok(())
    }
}

/// Access path to one cached value: an accessor routine `(A, C) -> T` of the artifact
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub accessor: MemberName,
    pub slot_type: SlotType,
}

impl CacheEntry {
    pub fn signature(&self) -> Signature {
        Signature::new(
            vec![SlotType::Artifact, SlotType::Context],
            Some(self.slot_type),
        )
    }

    /// Push the cached value
    pub fn load(&self, code: &mut CodeBuilder) -> Result<(), Error> {
        code.get_local(THIS)?;
        code.get_local(CONTEXT)?;
        code.invoke_routine(self.accessor.clone(), self.signature())?;
        Ok(())
    }
}

/// Per-artifact cache of runtime-constructed values
///
/// Field-cached entries get a private field plus a lazily initializing accessor. Dynamically
/// linked entries get an accessor whose only work is one dynamically linked call carrying the
/// construction parameters as its bootstrap. Constants cached in fields are revalidated against
/// the global constant generation; dynamically linked constants rely on the runtime's per-name
/// invalidation instead.
#[derive(Default)]
pub struct Cache {
    entries: HashMap<CacheKey, CacheEntry>,
    counters: HashMap<&'static str, usize>,

    /// Generation fields, which must start out invalid (`-1`)
    generation_fields: Vec<MemberName>,

    /// Once fields by site, so a site compiled more than once still evaluates once
    once_fields: HashMap<usize, MemberName>,
}

impl Cache {
    pub fn new() -> Cache {
        Cache::default()
    }

    /// Number of distinct entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation_fields(&self) -> &[MemberName] {
        &self.generation_fields
    }

    /// Get the entry for a key, generating its field(s) and accessor the first time
    pub fn obtain(
        &mut self,
        artifact: &mut Artifact,
        linkage: &DynamicLinkage,
        key: CacheKey,
    ) -> Result<CacheEntry, Error> {
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }

        let counter = self.counters.entry(key.kind()).or_insert(0);
        let index = *counter;
        *counter += 1;

        let field_name = MemberName::numbered(key.kind(), index);
        let entry = CacheEntry {
            accessor: MemberName::numbered(&format!("get_{}", key.kind()), index),
            slot_type: key.slot_type(),
        };
        let mut code = CodeBuilder::new(entry.signature());

        if key.dynamically_linked(linkage) {
            log::trace!("linking {:?} dynamically through {}", key, entry.accessor);
            code.get_local(CONTEXT)?;
            code.invoke_dynamic(
                key.bootstrap(),
                Signature::new(vec![SlotType::Context], Some(entry.slot_type)),
            )?;
            code.return_value()?;
        } else if let CacheKey::Constant { .. } = key {
            log::trace!("caching {:?} in field {}", key, field_name);
            let generation_field =
                MemberName::numbered(&format!("{}_generation", key.kind()), index);
            Self::constant_accessor(&mut code, &key, &field_name, &generation_field)?;
            artifact.add_field(Self::field(field_name, SlotType::Object))?;
            artifact.add_field(Self::field(generation_field.clone(), SlotType::Int))?;
            self.generation_fields.push(generation_field);
        } else {
            log::trace!("caching {:?} in field {}", key, field_name);
            Self::lazy_accessor(&mut code, &key, &field_name)?;
            artifact.add_field(Self::field(field_name, entry.slot_type))?;
        }

        artifact.add_routine(Routine {
            access_flags: RoutineAccessFlags::PRIVATE | RoutineAccessFlags::SYNTHETIC,
            name: entry.accessor.clone(),
            signature: entry.signature(),
            code: code.result()?,
        })?;
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Field caching a value computed the first time a particular site runs (`/.../o`)
    pub fn once_field(
        &mut self,
        artifact: &mut Artifact,
        site: usize,
    ) -> Result<MemberName, Error> {
        if let Some(name) = self.once_fields.get(&site) {
            return Ok(name.clone());
        }
        let name = MemberName::numbered("once", self.once_fields.len());
        artifact.add_field(Self::field(name.clone(), SlotType::Object))?;
        self.once_fields.insert(site, name.clone());
        Ok(name)
    }

    fn field(name: MemberName, slot_type: SlotType) -> Field {
        Field {
            access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::SYNTHETIC,
            name,
            slot_type,
        }
    }

    /// Return the field if set, otherwise construct, store, and return the value
    fn lazy_accessor(
        code: &mut CodeBuilder,
        key: &CacheKey,
        field: &MemberName,
    ) -> Result<(), Error> {
        let done = code.fresh_label();
        code.get_local(THIS)?;
        code.push_instruction(Instruction::GetField(field.clone()))?;
        code.dup()?;
        code.branch_if(Test::NonNull, done)?;
        code.pop()?;
        key.construct(code)?;
        code.dup()?;
        code.get_local(THIS)?;
        code.swap()?;
        code.push_instruction(Instruction::PutField(field.clone()))?;
        code.place_label(done)?;
        code.return_value()?;
        Ok(())
    }

    /// Return the field if it was filled during the current constant generation, otherwise look
    /// the constant up again
    fn constant_accessor(
        code: &mut CodeBuilder,
        key: &CacheKey,
        field: &MemberName,
        generation_field: &MemberName,
    ) -> Result<(), Error> {
        let refresh = code.fresh_label();
        code.get_local(THIS)?;
        code.push_instruction(Instruction::GetField(generation_field.clone()))?;
        code.get_local(CONTEXT)?;
        code.invoke(RuntimeHelper::ConstantGeneration)?;
        code.push_branch_instruction(BranchInstruction::IfICmp(OrdComparison::NE, refresh, ()))?;
        code.get_local(THIS)?;
        code.push_instruction(Instruction::GetField(field.clone()))?;
        code.return_value()?;

        code.place_label(refresh)?;
        key.construct(code)?;
        code.dup()?;
        code.get_local(THIS)?;
        code.swap()?;
        code.push_instruction(Instruction::PutField(field.clone()))?;
        code.get_local(THIS)?;
        code.get_local(CONTEXT)?;
        code.invoke(RuntimeHelper::ConstantGeneration)?;
        code.push_instruction(Instruction::PutField(generation_field.clone()))?;
        code.return_value()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{ArtifactName, Name};

    fn artifact() -> Artifact {
        Artifact::new(
            ArtifactName::from_string("scripts/test".to_string()).unwrap(),
            "test.rb".to_string(),
        )
    }

    #[test]
    fn equal_keys_share_an_entry() {
        let mut artifact = artifact();
        let mut cache = Cache::new();
        let first = cache
            .obtain(&mut artifact, &DynamicLinkage::NONE, CacheKey::Symbol("a".into()))
            .unwrap();
        let again = cache
            .obtain(&mut artifact, &DynamicLinkage::NONE, CacheKey::Symbol("a".into()))
            .unwrap();
        let other = cache
            .obtain(&mut artifact, &DynamicLinkage::NONE, CacheKey::Symbol("b".into()))
            .unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(cache.len(), 2);
        assert_eq!(artifact.fields().len(), 2);
        assert_eq!(artifact.routines().len(), 2);
    }

    #[test]
    fn constants_track_generations() {
        let mut artifact = artifact();
        let mut cache = Cache::new();
        let key = CacheKey::Constant {
            name: "Foo".into(),
            site: 7,
        };
        let entry = cache
            .obtain(&mut artifact, &DynamicLinkage::NONE, key)
            .unwrap();
        assert_eq!(entry.slot_type, SlotType::Object);
        assert_eq!(cache.generation_fields().len(), 1);
        assert_eq!(artifact.fields().len(), 2);
    }

    #[test]
    fn dynamic_linkage_needs_no_fields() {
        let mut artifact = artifact();
        let mut cache = Cache::new();
        let entry = cache
            .obtain(
                &mut artifact,
                &DynamicLinkage::ALL,
                CacheKey::CallSite {
                    name: "puts".into(),
                    call_type: CallType::Functional,
                    site: 1,
                },
            )
            .unwrap();
        assert!(artifact.fields().is_empty());
        let accessor = artifact.routine(entry.accessor.as_str()).unwrap();
        assert_eq!(accessor.signature.render(), "(AC)L");
        assert!(accessor
            .code
            .instructions()
            .any(|insn| matches!(insn, Instruction::InvokeDynamic(_))));
    }

    fn key(choice: u8) -> CacheKey {
        match choice % 4 {
            0 => CacheKey::Symbol(format!("s{}", choice / 4)),
            1 => CacheKey::Fixnum(i64::from(choice / 4)),
            2 => CacheKey::Str(format!("t{}", choice / 4)),
            _ => CacheKey::Constant {
                name: "C".into(),
                site: usize::from(choice / 4),
            },
        }
    }

    proptest::proptest! {
        #[test]
        fn obtaining_is_idempotent(choices in proptest::collection::vec(0u8..24, 0..60)) {
            let mut artifact = artifact();
            let mut cache = Cache::new();
            let mut seen: HashMap<CacheKey, CacheEntry> = HashMap::new();
            for choice in choices {
                let entry = cache
                    .obtain(&mut artifact, &DynamicLinkage::NONE, key(choice))
                    .unwrap();
                let first = seen.entry(key(choice)).or_insert_with(|| entry.clone());
                proptest::prop_assert_eq!(&*first, &entry);
            }
            proptest::prop_assert_eq!(cache.len(), seen.len());
            proptest::prop_assert_eq!(artifact.routines().len(), seen.len());
        }
    }

    #[test]
    fn once_fields_are_per_site() {
        let mut artifact = artifact();
        let mut cache = Cache::new();
        let first = cache.once_field(&mut artifact, 0x10).unwrap();
        let again = cache.once_field(&mut artifact, 0x10).unwrap();
        let other = cache.once_field(&mut artifact, 0x20).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(artifact.fields().len(), 2);
    }
}
