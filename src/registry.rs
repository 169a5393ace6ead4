//! Object registry: maps `(object_id, instance_id)` to a concrete
//! `UavObject`, with instance 0 always holding the registered prototype.
//!
//! Multi-instance objects clone their prototype on first sight of a new
//! instance id (see `link::dispatch` for where that clone is triggered);
//! the registry itself only stores what it's told to.

use std::collections::HashMap;

use crate::error::UavTalkError;
use crate::object::UavObject;

/// Holds every registered object, keyed by object id then instance id.
pub struct ObjectRegistry {
    objects: HashMap<u32, Vec<Box<dyn UavObject>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    /// Registers `obj` as the instance-0 prototype for its object id.
    /// Fails if that object id is already registered.
    pub fn register_prototype(&mut self, obj: Box<dyn UavObject>) -> Result<(), UavTalkError> {
        let object_id = obj.object_id();
        if self.objects.contains_key(&object_id) {
            return Err(UavTalkError::DuplicatePrototype(object_id));
        }
        self.objects.insert(object_id, vec![obj]);
        Ok(())
    }

    /// Registers an additional instance of an already-prototyped object.
    /// Fails if the object id is unknown, is single-instance, or the
    /// instance id is already registered.
    pub fn register_instance(&mut self, obj: Box<dyn UavObject>) -> Result<(), UavTalkError> {
        let object_id = obj.object_id();
        let instance_id = obj.instance_id();

        let instances = self
            .objects
            .get_mut(&object_id)
            .ok_or(UavTalkError::UnknownObjectId(object_id))?;

        if instances[0].is_single_instance() {
            return Err(UavTalkError::SingleInstanceViolation(object_id, instance_id));
        }
        if instances.iter().any(|o| o.instance_id() == instance_id) {
            return Err(UavTalkError::DuplicateInstance(object_id, instance_id));
        }

        instances.push(obj);
        Ok(())
    }

    pub fn get(&self, object_id: u32, instance_id: u16) -> Option<&dyn UavObject> {
        self.objects
            .get(&object_id)?
            .iter()
            .find(|o| o.instance_id() == instance_id)
            .map(|o| o.as_ref())
    }

    pub fn get_mut(&mut self, object_id: u32, instance_id: u16) -> Option<&mut Box<dyn UavObject>> {
        self.objects
            .get_mut(&object_id)?
            .iter_mut()
            .find(|o| o.instance_id() == instance_id)
    }

    pub fn prototype(&self, object_id: u32) -> Option<&dyn UavObject> {
        self.objects.get(&object_id)?.first().map(|o| o.as_ref())
    }

    pub fn num_instances(&self, object_id: u32) -> usize {
        self.objects.get(&object_id).map_or(0, |v| v.len())
    }

    /// Iterates every instance of `object_id` in registration order.
    pub fn instances(&self, object_id: u32) -> impl Iterator<Item = &dyn UavObject> {
        self.objects
            .get(&object_id)
            .into_iter()
            .flatten()
            .map(|o| o.as_ref())
    }

    /// Iterates every registered object id.
    pub fn object_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.keys().copied()
    }

    /// Inserts `obj` as a new instance, cloned from the prototype's current
    /// implementation by the caller. Used by the dispatcher when an inbound
    /// frame names an instance id this registry hasn't seen yet.
    pub fn insert_cloned_instance(&mut self, obj: Box<dyn UavObject>) {
        let object_id = obj.object_id();
        self.objects.entry(object_id).or_insert_with(Vec::new).push(obj);
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
