//! Arena holding every descriptor produced by one linking run.

use super::{
    EnumDescriptor, EnumId, ExtensionId, FieldDescriptor, FileDescriptor, MessageDescriptor,
    MessageId, ServiceDescriptor,
};
use crate::error::{Error, Result};
use crate::wire;
use std::collections::HashMap;

/// A named type in the pool's single type namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    /// A message type
    Message(MessageId),
    /// An enum type
    Enum(EnumId),
}

/// Linked, immutable collection of descriptors.
///
/// The pool owns every descriptor; ids handed out by it stay valid for its
/// whole lifetime. It has no interior mutability, so a shared reference (or
/// an `Arc<DescriptorPool>`) can be read from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPool {
    pub(crate) files: Vec<FileDescriptor>,
    pub(crate) file_names: HashMap<String, usize>,
    pub(crate) messages: Vec<MessageDescriptor>,
    pub(crate) enums: Vec<EnumDescriptor>,
    pub(crate) extensions: Vec<FieldDescriptor>,
    pub(crate) types: HashMap<String, TypeRef>,
    pub(crate) extension_names: HashMap<String, ExtensionId>,
    pub(crate) extension_index: HashMap<(MessageId, u32), ExtensionId>,
    pub(crate) services: HashMap<String, (usize, usize)>,
}

fn strip_dot(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

impl DescriptorPool {
    /// Looks up a message by qualified name (a leading `.` is accepted).
    pub fn get_message_by_name(&self, name: &str) -> Result<&MessageDescriptor> {
        match self.types.get(strip_dot(name)) {
            Some(TypeRef::Message(id)) => Ok(&self.messages[id.0]),
            _ => Err(Error::unknown_type(strip_dot(name))),
        }
    }

    /// Looks up an enum by qualified name
    pub fn get_enum_by_name(&self, name: &str) -> Option<&EnumDescriptor> {
        match self.types.get(strip_dot(name)) {
            Some(TypeRef::Enum(id)) => Some(&self.enums[id.0]),
            _ => None,
        }
    }

    /// Resolves a qualified name to a message or enum
    pub fn resolve_type(&self, name: &str) -> Option<TypeRef> {
        self.types.get(strip_dot(name)).copied()
    }

    /// Message by id
    pub fn message(&self, id: MessageId) -> &MessageDescriptor {
        &self.messages[id.0]
    }

    /// Enum by id
    pub fn enum_type(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.0]
    }

    /// Extension field by id
    pub fn extension(&self, id: ExtensionId) -> &FieldDescriptor {
        &self.extensions[id.0]
    }

    /// Looks up an extension by qualified name
    pub fn get_extension_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.extension_names
            .get(strip_dot(name))
            .map(|id| &self.extensions[id.0])
    }

    /// The extension registered for `number` on `extendee`, if any
    pub fn find_extension(&self, extendee: MessageId, number: u32) -> Option<&FieldDescriptor> {
        self.extension_index
            .get(&(extendee, number))
            .map(|id| &self.extensions[id.0])
    }

    /// Every extension of `extendee`, ordered by field number
    pub fn extensions_of(&self, extendee: MessageId) -> Vec<&FieldDescriptor> {
        let mut found: Vec<_> = self
            .extensions
            .iter()
            .filter(|ext| ext.containing == extendee)
            .collect();
        found.sort_by_key(|ext| ext.number);
        found
    }

    /// Looks up a service by qualified name
    pub fn get_service_by_name(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services
            .get(strip_dot(name))
            .map(|&(file, index)| &self.files[file].services[index])
    }

    /// Linked files, dependencies before dependents
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Looks up a file by name
    pub fn get_file_by_name(&self, name: &str) -> Option<&FileDescriptor> {
        self.file_names.get(name).map(|&i| &self.files[i])
    }

    /// The file that declares a message
    pub fn file_of(&self, id: MessageId) -> &FileDescriptor {
        &self.files[self.messages[id.0].file]
    }

    /// The file that declares an enum
    pub fn file_of_enum(&self, id: EnumId) -> &FileDescriptor {
        &self.files[self.enums[id.0].file]
    }

    /// All messages, in allocation order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> + '_ {
        self.messages.iter()
    }

    /// All enums, in allocation order
    pub fn enums(&self) -> impl Iterator<Item = &EnumDescriptor> + '_ {
        self.enums.iter()
    }

    pub(crate) fn add_file(&mut self, file: FileDescriptor) -> Result<usize> {
        if self.file_names.contains_key(&file.name) {
            return Err(Error::schema(&file.name, "file is defined more than once"));
        }
        let index = self.files.len();
        self.file_names.insert(file.name.clone(), index);
        self.files.push(file);
        Ok(index)
    }

    fn claim_name(&mut self, full_name: &str, kind: TypeRef) -> Result<()> {
        if self.types.contains_key(full_name) || self.extension_names.contains_key(full_name) {
            return Err(Error::schema(
                full_name,
                "name is already declared in this scope",
            ));
        }
        self.types.insert(full_name.to_string(), kind);
        Ok(())
    }

    /// Allocates an empty message slot so later references can resolve to it.
    pub(crate) fn reserve_message(
        &mut self,
        name: &str,
        full_name: &str,
        file: usize,
        parent: Option<MessageId>,
    ) -> Result<MessageId> {
        let id = MessageId(self.messages.len());
        self.claim_name(full_name, TypeRef::Message(id))?;
        self.messages
            .push(MessageDescriptor::shell(id, name, full_name, file, parent));
        match parent {
            Some(parent) => self.messages[parent.0].nested_messages.push(id),
            None => self.files[file].messages.push(id),
        }
        Ok(id)
    }

    /// Allocates an empty enum slot.
    pub(crate) fn reserve_enum(
        &mut self,
        name: &str,
        full_name: &str,
        file: usize,
        parent: Option<MessageId>,
    ) -> Result<EnumId> {
        let id = EnumId(self.enums.len());
        self.claim_name(full_name, TypeRef::Enum(id))?;
        self.enums
            .push(EnumDescriptor::shell(id, name, full_name, file, parent));
        match parent {
            Some(parent) => self.messages[parent.0].nested_enums.push(id),
            None => self.files[file].enums.push(id),
        }
        Ok(id)
    }

    pub(crate) fn message_mut(&mut self, id: MessageId) -> &mut MessageDescriptor {
        &mut self.messages[id.0]
    }

    pub(crate) fn enum_mut(&mut self, id: EnumId) -> &mut EnumDescriptor {
        &mut self.enums[id.0]
    }

    /// Registers an extension after checking it against its extendee.
    pub(crate) fn add_extension(
        &mut self,
        extension: FieldDescriptor,
        scope: Option<MessageId>,
        file: usize,
    ) -> Result<ExtensionId> {
        let extendee = &self.messages[extension.containing.0];
        let number = extension.number;

        if !wire::is_valid_field_number(number) {
            return Err(Error::schema(
                &extension.full_name,
                format!("field number {} is not allowed", number),
            ));
        }

        if let Some(existing) = extendee.field(number) {
            return Err(Error::ExtensionConflict {
                extendee: extendee.full_name.clone(),
                number,
                existing: existing.full_name.clone(),
                conflicting: extension.full_name.clone(),
            });
        }
        if let Some(existing) = self.find_extension(extension.containing, number) {
            return Err(Error::ExtensionConflict {
                extendee: extendee.full_name.clone(),
                number,
                existing: existing.full_name.clone(),
                conflicting: extension.full_name.clone(),
            });
        }
        if !extendee.is_extension_number(number) {
            return Err(Error::schema(
                &extension.full_name,
                format!(
                    "'{}' does not declare {} as an extension number",
                    extendee.full_name, number
                ),
            ));
        }
        if self.types.contains_key(&extension.full_name)
            || self.extension_names.contains_key(&extension.full_name)
        {
            return Err(Error::schema(
                &extension.full_name,
                "name is already declared in this scope",
            ));
        }

        let id = ExtensionId(self.extensions.len());
        self.extension_index.insert((extension.containing, number), id);
        self.extension_names.insert(extension.full_name.clone(), id);
        self.extensions.push(extension);
        match scope {
            Some(scope) => self.messages[scope.0].scoped_extensions.push(id),
            None => self.files[file].extensions.push(id),
        }
        Ok(id)
    }

    pub(crate) fn add_service(&mut self, file: usize, service: ServiceDescriptor) -> Result<()> {
        if self.services.contains_key(&service.full_name) || self.types.contains_key(&service.full_name) {
            return Err(Error::schema(
                &service.full_name,
                "name is already declared in this scope",
            ));
        }
        let index = self.files[file].services.len();
        self.services
            .insert(service.full_name.clone(), (file, index));
        self.files[file].services.push(service);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_pool;

    #[test]
    fn test_lookup_by_name() {
        let pool = fixture_pool();
        let simple = pool.get_message_by_name("test.Simple").unwrap();
        assert_eq!(simple.full_name(), "test.Simple");
        assert_eq!(
            pool.get_message_by_name(".test.Simple").unwrap().id(),
            simple.id()
        );
        assert!(matches!(
            pool.get_message_by_name("test.Missing"),
            Err(Error::UnknownType { .. })
        ));
        // Enums live in the same namespace but are not messages.
        assert!(pool.get_message_by_name("test.PhoneType").is_err());
        assert!(pool.get_enum_by_name("test.PhoneType").is_some());
    }

    #[test]
    fn test_nested_types() {
        let pool = fixture_pool();
        let complex = pool.get_message_by_name("test.Complex").unwrap();
        let nested = pool.get_message_by_name("test.Complex.Nested").unwrap();
        assert_eq!(nested.parent(), Some(complex.id()));
        assert!(complex.nested_messages().contains(&nested.id()));
        assert_eq!(pool.file_of(nested.id()).name(), "test/complex.proto");
    }

    #[test]
    fn test_extension_lookup() {
        let pool = fixture_pool();
        let ext_a = pool.get_message_by_name("test.ExtA").unwrap();
        let second = pool.get_extension_by_name("test.ExtB.second").unwrap();
        assert!(second.is_extension());
        assert_eq!(second.containing_type(), "test.ExtA");

        let found = pool.find_extension(ext_a.id(), second.number()).unwrap();
        assert_eq!(found.full_name(), "test.ExtB.second");
        assert_eq!(pool.extensions_of(ext_a.id()).len(), 1);
        assert!(pool.find_extension(ext_a.id(), 1).is_none());
    }
}
