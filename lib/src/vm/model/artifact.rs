use super::{Field, Routine};
use crate::abi::Descriptor;
use crate::vm::{ArtifactName, Error, MemberName};
use std::collections::HashMap;

/// Generated unit of code: a zero-argument constructor, an entry routine, one routine per
/// compiled body, cache fields, and the descriptor table the runtime uses to register methods
/// and closures
#[derive(Clone, Debug)]
pub struct Artifact {
    pub name: ArtifactName,
    pub source_file: String,
    fields: Vec<Field>,
    routines: Vec<Routine>,
    routine_index: HashMap<MemberName, usize>,
    descriptors: Vec<Descriptor>,
}

impl Artifact {
    pub fn new(name: ArtifactName, source_file: String) -> Artifact {
        Artifact {
            name,
            source_file,
            fields: vec![],
            routines: vec![],
            routine_index: HashMap::new(),
            descriptors: vec![],
        }
    }

    /// Add a field to the artifact
    pub fn add_field(&mut self, field: Field) -> Result<(), Error> {
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(Error::DuplicateMember(field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Add a routine to the artifact
    pub fn add_routine(&mut self, routine: Routine) -> Result<(), Error> {
        if self.routine_index.contains_key(&routine.name) {
            return Err(Error::DuplicateMember(routine.name));
        }
        log::debug!(
            "adding routine {} {} ({} ops, {} handlers)",
            routine.name,
            routine.signature,
            routine.code.ops.len(),
            routine.code.handlers.len()
        );
        self.routine_index
            .insert(routine.name.clone(), self.routines.len());
        self.routines.push(routine);
        Ok(())
    }

    /// Register a descriptor, returning its index in the descriptor table
    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> usize {
        self.descriptors.push(descriptor);
        self.descriptors.len() - 1
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn routines(&self) -> &[Routine] {
        &self.routines
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routine_index
            .iter()
            .find(|(routine_name, _)| routine_name.as_ref() == name)
            .map(|(_, idx)| &self.routines[*idx])
    }

    pub fn routine_position(&self, name: &MemberName) -> Option<usize> {
        self.routine_index.get(name).copied()
    }

    pub fn field_position(&self, name: &MemberName) -> Option<usize> {
        self.fields.iter().position(|field| &field.name == name)
    }
}
