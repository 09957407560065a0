//! Bidirectional mapping between user message types and [`MessageInfo`].
//!
//! Grounded in `messages.py` and, for the type-erasure shape, in
//! `nautilus-common`'s `msgbus::handler` module, which stores callbacks
//! behind `dyn Any` the same way this registry stores `TypeId` keys rather
//! than concrete generic parameters.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PolyBusError, Result};
use crate::message_info::MessageInfo;

/// A process-level (per-bus) registry mapping Rust types to their wire
/// [`MessageInfo`] and back.
///
/// All operations take a single internal mutex; contention is negligible in
/// practice because registration happens at configuration time and lookups
/// dominate at steady state.
#[derive(Default)]
pub struct MessageRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_type: HashMap<TypeId, (MessageInfo, String)>,
    by_info: HashMap<MessageInfo, TypeId>,
}

impl MessageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `info`, populating both directions.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if `T` is already
    /// registered; double registration reuses the same lookup-failure
    /// error kind rather than a dedicated variant.
    pub fn register<T: Any + Send + Sync + 'static>(&self, info: MessageInfo) -> Result<MessageInfo> {
        let type_id = TypeId::of::<T>();
        let header = info.to_string(true);
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.by_type.contains_key(&type_id) {
            return Err(PolyBusError::MessageNotFound);
        }
        inner.by_info.insert(info.clone(), type_id);
        inner.by_type.insert(type_id, (info.clone(), header));
        Ok(info)
    }

    /// Returns the [`MessageInfo`] registered for `T`.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if `T` is not registered.
    pub fn info_for<T: Any + 'static>(&self) -> Result<MessageInfo> {
        self.info_for_type_id(TypeId::of::<T>())
    }

    /// Returns the [`MessageInfo`] registered for `type_id`.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if absent.
    pub fn info_for_type_id(&self, type_id: TypeId) -> Result<MessageInfo> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .by_type
            .get(&type_id)
            .map(|(info, _)| info.clone())
            .ok_or(PolyBusError::MessageNotFound)
    }

    /// Returns the [`TypeId`] registered for a major-compatible `info`.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if no entry matches
    /// `(kind, endpoint, name, major)`.
    pub fn type_for(&self, info: &MessageInfo) -> Result<TypeId> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_info.get(info).copied().ok_or(PolyBusError::MessageNotFound)
    }

    /// Returns the canonical with-version header string for `info`.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if `info` isn't registered.
    pub fn header_for(&self, info: &MessageInfo) -> Result<String> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let type_id = inner.by_info.get(info).ok_or(PolyBusError::MessageNotFound)?;
        inner
            .by_type
            .get(type_id)
            .map(|(_, header)| header.clone())
            .ok_or(PolyBusError::MessageNotFound)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message_info::MessageKind;

    struct CreateUser;
    struct UpdateUser;

    fn info(major: u32, minor: u32, patch: u32) -> MessageInfo {
        MessageInfo::new(MessageKind::Event, "svc", "n", major, minor, patch)
    }

    #[test]
    fn round_trips_type_to_info_and_back() {
        let registry = MessageRegistry::new();
        registry.register::<CreateUser>(info(1, 0, 0)).expect("register");

        let looked_up_info = registry.info_for::<CreateUser>().expect("info_for");
        let type_id = registry.type_for(&looked_up_info).expect("type_for");
        assert_eq!(type_id, TypeId::of::<CreateUser>());
    }

    #[test]
    fn rejects_double_registration() {
        let registry = MessageRegistry::new();
        registry.register::<CreateUser>(info(1, 0, 0)).expect("register");
        let err = registry.register::<CreateUser>(info(1, 0, 0)).unwrap_err();
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn unregistered_type_is_not_found() {
        let registry = MessageRegistry::new();
        let err = registry.info_for::<UpdateUser>().unwrap_err();
        assert_eq!(err.code(), 2);
    }

    #[rstest]
    #[case(2, 1, 3, 2, 5, 9, true)]
    #[case(2, 1, 3, 3, 1, 3, false)]
    fn version_compatible_lookup(
        #[case] reg_major: u32,
        #[case] reg_minor: u32,
        #[case] reg_patch: u32,
        #[case] lookup_major: u32,
        #[case] lookup_minor: u32,
        #[case] lookup_patch: u32,
        #[case] should_match: bool,
    ) {
        let registry = MessageRegistry::new();
        registry
            .register::<CreateUser>(info(reg_major, reg_minor, reg_patch))
            .expect("register");

        let lookup_info = info(lookup_major, lookup_minor, lookup_patch);
        let result = registry.type_for(&lookup_info);
        assert_eq!(result.is_ok(), should_match);
    }

    #[test]
    fn header_for_returns_canonical_with_version_string() {
        let registry = MessageRegistry::new();
        let registered = registry.register::<CreateUser>(info(1, 2, 3)).expect("register");
        let header = registry.header_for(&registered).expect("header_for");
        assert_eq!(header, "endpoint=svc, type=event, name=n, version=1.2.3");
    }
}
