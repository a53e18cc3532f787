/*++

Licensed under the Apache-2.0 license.

File Name:

    store.rs

Abstract:

    File contains the model's asset store: fixed-capacity slot table keyed
    by module-minted IDs, with the create-then-fill life cycle and the
    static root-key slot.

--*/

use coffer_api::{AssetId, AssetPolicy, HwStatus, MAX_ASSET_SIZE};
use std::collections::HashMap;

/// Slot count the modeled firmware reports NoMemory at.
pub const MAX_ASSETS: usize = 64;

/// Static number the device root key answers to in search commands.
pub const ROOT_KEY_NUMBER: u32 = 1;

struct Slot {
    policy: AssetPolicy,
    size: u32,
    /// `None` until the slot is filled. Fill is one-way for key material;
    /// only role-shaped state slots are rewritten in place.
    data: Option<Vec<u8>>,
}

/// The module-side asset table. IDs are minted monotonically and never
/// reused within a power cycle, so a stale handle can only miss.
pub(crate) struct AssetStore {
    slots: HashMap<u32, Slot>,
    statics: HashMap<u32, u32>,
    next_id: u32,
}

impl AssetStore {
    /// Build the power-on store: empty except for the preloaded root key
    /// under [`ROOT_KEY_NUMBER`].
    pub fn new(root_key: [u8; 32]) -> Self {
        let mut store = AssetStore {
            slots: HashMap::new(),
            statics: HashMap::new(),
            next_id: 1,
        };
        let root = store.mint();
        store.slots.insert(
            root,
            Slot {
                policy: AssetPolicy::TRUSTED_DERIVE,
                size: 32,
                data: Some(root_key.to_vec()),
            },
        );
        store.statics.insert(ROOT_KEY_NUMBER, root);
        store
    }

    fn mint(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocate an empty slot. The policy is fixed here; nothing after this
    /// call can change it.
    pub fn create(&mut self, policy: AssetPolicy, size: u32) -> Result<AssetId, HwStatus> {
        if size == 0 || size as usize > MAX_ASSET_SIZE {
            return Err(HwStatus::InvalidLength);
        }
        if self.slots.len() >= MAX_ASSETS {
            return Err(HwStatus::NoMemory);
        }
        let id = self.mint();
        self.slots.insert(
            id,
            Slot {
                policy,
                size,
                data: None,
            },
        );
        Ok(AssetId(id))
    }

    /// Free a slot. Static slots never delete; the root key survives every
    /// session.
    pub fn delete(&mut self, id: AssetId) -> Result<(), HwStatus> {
        if self.statics.values().any(|v| *v == id.0) {
            return Err(HwStatus::OperationFailed);
        }
        match self.slots.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(HwStatus::InvalidParameter),
        }
    }

    /// Resolve a static asset number to its slot.
    pub fn find_static(&self, number: u32) -> Result<(AssetId, u32), HwStatus> {
        let id = *self
            .statics
            .get(&number)
            .ok_or(HwStatus::InvalidParameter)?;
        let slot = self.slots.get(&id).ok_or(HwStatus::InternalError)?;
        Ok((AssetId(id), slot.size))
    }

    pub fn policy(&self, id: AssetId) -> Result<AssetPolicy, HwStatus> {
        Ok(self.slots.get(&id.0).ok_or(HwStatus::InvalidParameter)?.policy)
    }

    pub fn size(&self, id: AssetId) -> Result<u32, HwStatus> {
        Ok(self.slots.get(&id.0).ok_or(HwStatus::InvalidParameter)?.size)
    }

    pub fn is_filled(&self, id: AssetId) -> Result<bool, HwStatus> {
        Ok(self
            .slots
            .get(&id.0)
            .ok_or(HwStatus::InvalidParameter)?
            .data
            .is_some())
    }

    /// One-way fill of a created slot with key material.
    pub fn fill(&mut self, id: AssetId, data: &[u8]) -> Result<(), HwStatus> {
        let slot = self.slots.get_mut(&id.0).ok_or(HwStatus::InvalidParameter)?;
        if slot.data.is_some() {
            return Err(HwStatus::OperationFailed);
        }
        if data.len() != slot.size as usize {
            return Err(HwStatus::InvalidLength);
        }
        slot.data = Some(data.to_vec());
        Ok(())
    }

    /// Read a streaming-state slot. The role check is the parked-state type
    /// rule: a slot created for one role never answers for another.
    pub fn read_state(
        &self,
        id: AssetId,
        role: AssetPolicy,
        expect_len: usize,
    ) -> Result<Vec<u8>, HwStatus> {
        let slot = self.slots.get(&id.0).ok_or(HwStatus::InvalidParameter)?;
        if slot.policy != role {
            return Err(HwStatus::InvalidParameter);
        }
        let data = slot.data.as_ref().ok_or(HwStatus::OperationFailed)?;
        if data.len() != expect_len {
            return Err(HwStatus::InvalidLength);
        }
        Ok(data.clone())
    }

    /// Park streaming state into a role slot. Unlike [`AssetStore::fill`]
    /// this overwrites, so one slot can hold successive parks.
    pub fn write_state(
        &mut self,
        id: AssetId,
        role: AssetPolicy,
        data: &[u8],
    ) -> Result<(), HwStatus> {
        let slot = self.slots.get_mut(&id.0).ok_or(HwStatus::InvalidParameter)?;
        if slot.policy != role {
            return Err(HwStatus::InvalidParameter);
        }
        if data.len() > slot.size as usize {
            return Err(HwStatus::InvalidLength);
        }
        slot.data = Some(data.to_vec());
        Ok(())
    }

    /// Read key material with its governing policy. Shape and usage checks
    /// are the operation handlers' job; the store only refuses unfilled
    /// slots.
    pub fn read_key(&self, id: AssetId) -> Result<(Vec<u8>, AssetPolicy), HwStatus> {
        let slot = self.slots.get(&id.0).ok_or(HwStatus::InvalidParameter)?;
        let data = slot.data.as_ref().ok_or(HwStatus::OperationFailed)?;
        Ok((data.clone(), slot.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AssetStore {
        AssetStore::new([0x42; 32])
    }

    fn key_policy() -> AssetPolicy {
        AssetPolicy::ALGO_AES | AssetPolicy::FUNC_ENCRYPT
    }

    #[test]
    fn test_root_key_preloaded() {
        let s = store();
        let (id, size) = s.find_static(ROOT_KEY_NUMBER).unwrap();
        assert!(id.is_valid());
        assert_eq!(size, 32);
        let (key, policy) = s.read_key(id).unwrap();
        assert_eq!(key, vec![0x42; 32]);
        assert_eq!(policy, AssetPolicy::TRUSTED_DERIVE);
    }

    #[test]
    fn test_create_fill_once() {
        let mut s = store();
        let id = s.create(key_policy(), 16).unwrap();
        assert!(!s.is_filled(id).unwrap());

        // Reads before fill are refused.
        assert_eq!(s.read_key(id).err(), Some(HwStatus::OperationFailed));

        // Size mismatch is refused, slot stays empty.
        assert_eq!(s.fill(id, &[0; 8]).err(), Some(HwStatus::InvalidLength));
        s.fill(id, &[0x11; 16]).unwrap();

        // Second fill is refused.
        assert_eq!(s.fill(id, &[0x22; 16]).err(), Some(HwStatus::OperationFailed));
        assert_eq!(s.read_key(id).unwrap().0, vec![0x11; 16]);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut s = store();
        let a = s.create(key_policy(), 16).unwrap();
        s.delete(a).unwrap();
        let b = s.create(key_policy(), 16).unwrap();
        assert_ne!(a, b);
        // The stale handle misses.
        assert_eq!(s.read_key(a).err(), Some(HwStatus::InvalidParameter));
    }

    #[test]
    fn test_root_key_undeletable() {
        let mut s = store();
        let (root, _) = s.find_static(ROOT_KEY_NUMBER).unwrap();
        assert_eq!(s.delete(root).err(), Some(HwStatus::OperationFailed));
    }

    #[test]
    fn test_capacity_bounded() {
        let mut s = store();
        // One slot is the root key.
        for _ in 0..MAX_ASSETS - 1 {
            s.create(key_policy(), 16).unwrap();
        }
        assert_eq!(
            s.create(key_policy(), 16).err(),
            Some(HwStatus::NoMemory)
        );
    }

    #[test]
    fn test_oversized_create_rejected() {
        let mut s = store();
        assert_eq!(s.create(key_policy(), 0).err(), Some(HwStatus::InvalidLength));
        assert_eq!(s.create(key_policy(), 65).err(), Some(HwStatus::InvalidLength));
    }

    #[test]
    fn test_state_role_checked() {
        let mut s = store();
        let iv_slot = s.create(AssetPolicy::ROLE_IV, 16).unwrap();
        s.write_state(iv_slot, AssetPolicy::ROLE_IV, &[0xAA; 16]).unwrap();

        // Reading it back as a counter slot is refused.
        assert_eq!(
            s.read_state(iv_slot, AssetPolicy::ROLE_COUNTER, 16).err(),
            Some(HwStatus::InvalidParameter)
        );
        assert_eq!(
            s.read_state(iv_slot, AssetPolicy::ROLE_IV, 16).unwrap(),
            vec![0xAA; 16]
        );

        // Parking again overwrites.
        s.write_state(iv_slot, AssetPolicy::ROLE_IV, &[0xBB; 16]).unwrap();
        assert_eq!(
            s.read_state(iv_slot, AssetPolicy::ROLE_IV, 16).unwrap(),
            vec![0xBB; 16]
        );
    }
}
