use super::BodyCompiler;
use crate::abi::{RuntimeHelper, CONTEXT, THIS};
use crate::compiler::cache::CacheKey;
use crate::compiler::script::Counter;
use crate::compiler::ir::Node;
use crate::compiler::Error;
use crate::vm::{CodeBuilderExts, Instruction, MemberName, Signature, SlotType, Test};

/// Fixnums cheap enough to build inline rather than through the cache
const INLINE_FIXNUMS: std::ops::RangeInclusive<i64> = -1..=5;

/// Largest array literal built straight from stack values
const MAX_CONSTRUCT_ARRAY: usize = 10;

/// Largest hash literal built straight from stack values
const MAX_CONSTRUCT_HASH: usize = 5;

impl<'c, 's> BodyCompiler<'c, 's> {
    pub(super) fn compile_fixnum(&mut self, value: i64) -> Result<(), Error> {
        if INLINE_FIXNUMS.contains(&value) {
            self.code.get_local(CONTEXT)?;
            self.code.const_int(value)?;
            self.code.invoke(RuntimeHelper::NewFixnum)?;
            Ok(())
        } else {
            self.load_cached(CacheKey::Fixnum(value))
        }
    }

    /// String literals evaluate to a fresh copy of a cached frozen prototype
    pub(super) fn compile_string(&mut self, value: &str) -> Result<(), Error> {
        self.load_cached(CacheKey::Str(value.to_string()))?;
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.invoke(RuntimeHelper::StrDup)?;
        Ok(())
    }

    pub(super) fn compile_dstr(&mut self, parts: &[Node<'s>]) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.const_string("")?;
        self.code.invoke(RuntimeHelper::NewString)?;
        for part in parts {
            self.code.get_local(CONTEXT)?;
            self.code.swap()?;
            match part {
                // appending copies, so the frozen prototype can be used directly
                Node::Str(value) => self.load_cached(CacheKey::Str(value.clone()))?,
                _ => self.compile_value(part)?,
            }
            self.code.invoke(RuntimeHelper::AppendAsString)?;
        }
        Ok(())
    }

    pub(super) fn compile_dsymbol(&mut self, parts: &[Node<'s>]) -> Result<(), Error> {
        self.compile_dstr(parts)?;
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.invoke(RuntimeHelper::ToSymbol)?;
        Ok(())
    }

    pub(super) fn compile_dregexp(
        &mut self,
        site: usize,
        parts: &[Node<'s>],
        options: i64,
        once: bool,
    ) -> Result<(), Error> {
        if !once {
            return self.build_dregexp(parts, options);
        }

        let field = self.script.once_field(site)?;
        let done = self.code.fresh_label();
        self.code.get_local(THIS)?;
        self.code.push_instruction(Instruction::GetField(field.clone()))?;
        self.code.dup()?;
        self.code.branch_if(Test::NonNull, done)?;
        self.code.pop()?;
        self.build_dregexp(parts, options)?;
        self.code.dup()?;
        self.code.get_local(THIS)?;
        self.code.swap()?;
        self.code.push_instruction(Instruction::PutField(field))?;
        self.code.place_label(done)?;
        Ok(())
    }

    fn build_dregexp(&mut self, parts: &[Node<'s>], options: i64) -> Result<(), Error> {
        self.compile_dstr(parts)?;
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.const_int(options)?;
        self.code.invoke(RuntimeHelper::RegexpFromString)?;
        Ok(())
    }

    pub(super) fn compile_range(
        &mut self,
        begin: &Node<'s>,
        end: &Node<'s>,
        exclusive: bool,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_value(begin)?;
        self.compile_value(end)?;
        self.code.const_bool(exclusive)?;
        self.code.invoke(RuntimeHelper::NewRange)?;
        Ok(())
    }

    pub(super) fn compile_array(&mut self, elements: &[Node<'s>]) -> Result<(), Error> {
        let has_splat = elements.iter().any(is_splat);
        if has_splat {
            self.code.get_local(CONTEXT)?;
            self.code.invoke(RuntimeHelper::ConstructArray(0))?;
            for element in elements {
                self.append_to_array(element)?;
            }
        } else if elements.len() >= self.script.settings.array_chunk_threshold
            && elements.iter().all(Node::is_literal)
        {
            self.code.get_local(CONTEXT)?;
            self.compile_array_chunked(elements)?;
            self.code.invoke(RuntimeHelper::NewArray)?;
        } else if elements.len() <= MAX_CONSTRUCT_ARRAY {
            self.code.get_local(CONTEXT)?;
            for element in elements {
                self.compile_value(element)?;
            }
            self.code
                .invoke(RuntimeHelper::ConstructArray(elements.len() as u8))?;
        } else {
            self.code.get_local(CONTEXT)?;
            self.compile_host_array(elements)?;
            self.code.invoke(RuntimeHelper::NewArray)?;
        }
        Ok(())
    }

    /// Append an element (or the elements of a splat) to the language-level array on the stack
    pub(super) fn append_to_array(&mut self, element: &Node<'s>) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        match element {
            Node::Splat(inner) => {
                self.compile_value(inner)?;
                self.code.invoke(RuntimeHelper::ArrayConcat)?;
            }
            Node::ArgsCat(..) | Node::ArgsPush(..) => {
                self.compile_value(element)?;
                self.code.invoke(RuntimeHelper::ArrayConcat)?;
            }
            _ => {
                self.compile_value(element)?;
                self.code.invoke(RuntimeHelper::ArrayAppend)?;
            }
        }
        Ok(())
    }

    /// Push a host array holding the values of `elements`
    pub(super) fn compile_host_array(&mut self, elements: &[Node<'s>]) -> Result<(), Error> {
        self.code.const_int(elements.len() as i64)?;
        self.code.push_instruction(Instruction::NewArray)?;
        for (idx, element) in elements.iter().enumerate() {
            self.code.dup()?;
            self.code.const_int(idx as i64)?;
            self.compile_value(element)?;
            self.code.push_instruction(Instruction::ArrayStore)?;
        }
        Ok(())
    }

    /// Push a host array filled by a chain of builder routines, one per chunk of elements
    fn compile_array_chunked(&mut self, elements: &[Node<'s>]) -> Result<(), Error> {
        let chunk_size = self.script.settings.array_chunk_size.max(1);
        let chunks: Vec<&[Node<'s>]> = elements.chunks(chunk_size).collect();
        let names: Vec<MemberName> = chunks
            .iter()
            .map(|_| {
                MemberName::numbered("array_builder_", self.script.next_index(Counter::Chunk))
            })
            .collect();
        let signature = Signature::new(
            vec![SlotType::Artifact, SlotType::Context, SlotType::Objects],
            Some(SlotType::Objects),
        );
        log::debug!(
            "splitting array literal of {} elements across {} builders",
            elements.len(),
            chunks.len()
        );

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let offset = chunk_idx * chunk_size;
            let next = names.get(chunk_idx + 1).cloned();
            let next_signature = signature.clone();
            self.compile_builder(names[chunk_idx].clone(), signature.clone(), |builder| {
                for (idx, element) in chunk.iter().enumerate() {
                    builder.code.get_local(BUILDER_TARGET)?;
                    builder.code.const_int((offset + idx) as i64)?;
                    builder.compile_value(element)?;
                    builder.code.push_instruction(Instruction::ArrayStore)?;
                }
                builder.tail_call_builder(next, next_signature)
            })?;
        }

        self.code.get_local(THIS)?;
        self.code.get_local(CONTEXT)?;
        self.code.const_int(elements.len() as i64)?;
        self.code.push_instruction(Instruction::NewArray)?;
        self.code.invoke_routine(names[0].clone(), signature)?;
        Ok(())
    }

    pub(super) fn compile_hash(&mut self, pairs: &[(Node<'s>, Node<'s>)]) -> Result<(), Error> {
        if pairs.len() >= self.script.settings.hash_chunk_threshold
            && pairs.iter().all(|(k, v)| k.is_literal() && v.is_literal())
        {
            return self.compile_hash_chunked(pairs);
        }

        self.code.get_local(CONTEXT)?;
        if pairs.len() <= MAX_CONSTRUCT_HASH {
            for (key, value) in pairs {
                self.compile_value(key)?;
                self.compile_value(value)?;
            }
            self.code
                .invoke(RuntimeHelper::ConstructHash(pairs.len() as u8))?;
        } else {
            self.code.invoke(RuntimeHelper::NewHash)?;
            for (key, value) in pairs {
                self.store_pair(key, value)?;
            }
        }
        Ok(())
    }

    /// Store a pair into the hash on the stack, leaving the hash
    fn store_pair(&mut self, key: &Node<'s>, value: &Node<'s>) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.compile_value(key)?;
        self.compile_value(value)?;
        self.code.invoke(RuntimeHelper::HashStore)?;
        Ok(())
    }

    fn compile_hash_chunked(&mut self, pairs: &[(Node<'s>, Node<'s>)]) -> Result<(), Error> {
        let chunk_size = self.script.settings.hash_chunk_size.max(1);
        let chunks: Vec<&[(Node<'s>, Node<'s>)]> = pairs.chunks(chunk_size).collect();
        let names: Vec<MemberName> = chunks
            .iter()
            .map(|_| MemberName::numbered("hash_builder_", self.script.next_index(Counter::Chunk)))
            .collect();
        let signature = Signature::new(
            vec![SlotType::Artifact, SlotType::Context, SlotType::Object],
            Some(SlotType::Object),
        );
        log::debug!(
            "splitting hash literal of {} pairs across {} builders",
            pairs.len(),
            chunks.len()
        );

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let next = names.get(chunk_idx + 1).cloned();
            let next_signature = signature.clone();
            self.compile_builder(names[chunk_idx].clone(), signature.clone(), |builder| {
                builder.code.get_local(BUILDER_TARGET)?;
                for (key, value) in chunk.iter() {
                    builder.store_pair(key, value)?;
                }
                builder.code.pop()?;
                builder.tail_call_builder(next, next_signature)
            })?;
        }

        self.code.get_local(THIS)?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::NewHash)?;
        self.code.invoke_routine(names[0].clone(), signature)?;
        Ok(())
    }

    /// End a builder routine: hand the target over to the next builder, or return it
    fn tail_call_builder(
        &mut self,
        next: Option<MemberName>,
        signature: Signature,
    ) -> Result<(), Error> {
        if let Some(next) = next {
            self.code.get_local(THIS)?;
            self.code.get_local(CONTEXT)?;
            self.code.get_local(BUILDER_TARGET)?;
            self.code.invoke_routine(next, signature)?;
        } else {
            self.code.get_local(BUILDER_TARGET)?;
        }
        self.code.return_value()?;
        Ok(())
    }
}

/// Parameter slot of the array or hash a builder routine populates
pub(super) const BUILDER_TARGET: u16 = 2;

pub(super) fn is_splat(node: &Node<'_>) -> bool {
    matches!(node, Node::Splat(_) | Node::ArgsCat(..) | Node::ArgsPush(..))
}
