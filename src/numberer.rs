//! Dense integer identities for classes, members and analysis handles.
//!
//! Ids start at 1 so `0` can be used as "unnumbered" by consumers that store ids in
//! flat arrays. Two strategies implement [`Numberer`]:
//!
//! - [`ArrayNumberer`] holds elements strongly; ids are never reused.
//! - [`WeakNumberer`] holds `Weak` references; slots of dropped or removed elements
//!   are recycled and each slot carries a generation so a stale [`Handle`] never
//!   resolves to the slot's next occupant.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, Weak};

use crate::callgraph::InvokeKind;
use crate::error::{Result, SceneError};
use crate::model::{ClassDescriptor, FieldDescriptor, LocalDescriptor, MethodDescriptor, UnitRef};

pub type NumberId = u32;

/// Identity used to find an element's id.
pub trait Numberable: Clone {
    type Key: Eq + Hash;

    fn number_key(&self) -> Self::Key;
}

impl<T: ?Sized> Numberable for Arc<T> {
    type Key = usize;

    fn number_key(&self) -> usize {
        Arc::as_ptr(self) as *const () as usize
    }
}

impl Numberable for String {
    type Key = String;

    fn number_key(&self) -> String {
        self.clone()
    }
}

impl Numberable for InvokeKind {
    type Key = InvokeKind;

    fn number_key(&self) -> InvokeKind {
        *self
    }
}

pub trait Numberer<T> {
    /// Numbers `element`; an element that is already live keeps its id.
    fn add(&mut self, element: T) -> NumberId;

    fn get(&self, id: NumberId) -> Option<T>;

    fn index_of(&self, element: &T) -> Option<NumberId>;

    /// Forgets `element`. Returns false when it was not numbered.
    fn remove(&mut self, element: &T) -> bool;

    /// Number of live elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ArrayNumberer<T: Numberable> {
    slots: Vec<Option<T>>,
    index: HashMap<T::Key, NumberId>,
}

impl<T: Numberable> Default for ArrayNumberer<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Numberable> ArrayNumberer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: impl IntoIterator<Item = T>) -> Self {
        let mut numberer = Self::new();
        for element in elements {
            numberer.add(element);
        }
        numberer
    }

    /// Live elements in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NumberId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i as NumberId + 1, e)))
    }

    /// Highest id handed out so far.
    pub fn max_id(&self) -> NumberId {
        self.slots.len() as NumberId
    }
}

impl<T: Numberable> Numberer<T> for ArrayNumberer<T> {
    fn add(&mut self, element: T) -> NumberId {
        let key = element.number_key();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        self.slots.push(Some(element));
        let id = self.slots.len() as NumberId;
        self.index.insert(key, id);
        id
    }

    fn get(&self, id: NumberId) -> Option<T> {
        let slot = (id as usize).checked_sub(1)?;
        self.slots.get(slot).cloned().flatten()
    }

    fn index_of(&self, element: &T) -> Option<NumberId> {
        self.index.get(&element.number_key()).copied()
    }

    fn remove(&mut self, element: &T) -> bool {
        let Some(id) = self.index.remove(&element.number_key()) else {
            return false;
        };
        self.slots[id as usize - 1] = None;
        true
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// A generation-checked id handed out by [`WeakNumberer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub id: NumberId,
    pub generation: u32,
}

#[derive(Debug)]
struct WeakSlot<T: ?Sized> {
    generation: u32,
    element: Option<Weak<T>>,
}

#[derive(Debug)]
pub struct WeakNumberer<T: ?Sized> {
    slots: Vec<WeakSlot<T>>,
    index: HashMap<usize, NumberId>,
    free: Vec<NumberId>,
    adds_since_sweep: usize,
}

impl<T: ?Sized> Default for WeakNumberer<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            adds_since_sweep: 0,
        }
    }
}

impl<T: ?Sized> WeakNumberer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(element: &Arc<T>) -> usize {
        Arc::as_ptr(element) as *const () as usize
    }

    fn live(&self, id: NumberId) -> Option<Arc<T>> {
        let slot = self.slots.get((id as usize).checked_sub(1)?)?;
        slot.element.as_ref()?.upgrade()
    }

    /// Id of `element` if its slot still points at it.
    fn verified(&self, element: &Arc<T>) -> Option<NumberId> {
        let id = *self.index.get(&Self::key(element))?;
        let current = self.live(id)?;
        Arc::ptr_eq(&current, element).then_some(id)
    }

    fn vacate(&mut self, id: NumberId) {
        let slot = &mut self.slots[id as usize - 1];
        if let Some(weak) = slot.element.take() {
            let key = weak.as_ptr() as *const () as usize;
            if self.index.get(&key) == Some(&id) {
                self.index.remove(&key);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id);
        }
    }

    /// Recycles the slots of elements that were dropped elsewhere.
    pub fn reclaim(&mut self) -> usize {
        let dead: Vec<NumberId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.element
                    .as_ref()
                    .is_some_and(|weak| weak.strong_count() == 0)
            })
            .map(|(i, _)| i as NumberId + 1)
            .collect();
        for id in dead.iter() {
            self.vacate(*id);
        }
        self.adds_since_sweep = 0;
        dead.len()
    }

    pub fn handle_of(&self, element: &Arc<T>) -> Option<Handle> {
        let id = self.verified(element)?;
        Some(Handle {
            id,
            generation: self.slots[id as usize - 1].generation,
        })
    }

    pub fn resolve(&self, handle: Handle) -> Option<Arc<T>> {
        let slot = self.slots.get((handle.id as usize).checked_sub(1)?)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.element.as_ref()?.upgrade()
    }
}

impl<T: ?Sized> Numberer<Arc<T>> for WeakNumberer<T> {
    fn add(&mut self, element: Arc<T>) -> NumberId {
        if let Some(id) = self.verified(&element) {
            return id;
        }
        // The address may belong to a dropped element whose slot was never swept.
        if let Some(&stale) = self.index.get(&Self::key(&element)) {
            self.vacate(stale);
        }

        self.adds_since_sweep += 1;
        if self.free.is_empty() && self.adds_since_sweep >= self.slots.len().max(64) {
            self.reclaim();
        }

        let weak = Arc::downgrade(&element);
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize - 1].element = Some(weak);
                id
            }
            None => {
                self.slots.push(WeakSlot {
                    generation: 0,
                    element: Some(weak),
                });
                self.slots.len() as NumberId
            }
        };
        self.index.insert(Self::key(&element), id);
        id
    }

    fn get(&self, id: NumberId) -> Option<Arc<T>> {
        self.live(id)
    }

    fn index_of(&self, element: &Arc<T>) -> Option<NumberId> {
        self.verified(element)
    }

    fn remove(&mut self, element: &Arc<T>) -> bool {
        match self.verified(element) {
            Some(id) => {
                self.vacate(id);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.element
                    .as_ref()
                    .is_some_and(|weak| weak.strong_count() > 0)
            })
            .count()
    }
}

pub type DynNumberer<T> = Box<dyn Numberer<Arc<T>> + Send + Sync>;

fn numberer_for<T: Send + Sync + 'static>(weak: bool) -> Mutex<DynNumberer<T>> {
    if weak {
        Mutex::new(Box::new(WeakNumberer::<T>::new()))
    } else {
        Mutex::new(Box::new(ArrayNumberer::<Arc<T>>::new()))
    }
}

/// One numberer per domain, shared by the registry and analysis consumers.
pub struct NumbererService {
    classes: Mutex<DynNumberer<ClassDescriptor>>,
    methods: Mutex<DynNumberer<MethodDescriptor>>,
    fields: Mutex<DynNumberer<FieldDescriptor>>,
    locals: Mutex<DynNumberer<LocalDescriptor>>,
    units: Mutex<ArrayNumberer<Arc<UnitRef>>>,
    subsignatures: Mutex<ArrayNumberer<String>>,
    contexts: OnceLock<Mutex<DynNumberer<str>>>,
    kinds: ArrayNumberer<InvokeKind>,
}

impl NumbererService {
    pub fn new(weak_map_structures: bool) -> Self {
        Self {
            classes: numberer_for(weak_map_structures),
            methods: numberer_for(weak_map_structures),
            fields: numberer_for(weak_map_structures),
            locals: numberer_for(weak_map_structures),
            units: Mutex::new(ArrayNumberer::new()),
            subsignatures: Mutex::new(ArrayNumberer::new()),
            contexts: OnceLock::new(),
            kinds: ArrayNumberer::with_elements(InvokeKind::ALL),
        }
    }

    pub fn classes(&self) -> MutexGuard<'_, DynNumberer<ClassDescriptor>> {
        self.classes.lock()
    }

    pub fn methods(&self) -> MutexGuard<'_, DynNumberer<MethodDescriptor>> {
        self.methods.lock()
    }

    pub fn fields(&self) -> MutexGuard<'_, DynNumberer<FieldDescriptor>> {
        self.fields.lock()
    }

    pub fn locals(&self) -> MutexGuard<'_, DynNumberer<LocalDescriptor>> {
        self.locals.lock()
    }

    pub fn units(&self) -> MutexGuard<'_, ArrayNumberer<Arc<UnitRef>>> {
        self.units.lock()
    }

    /// Interns a subsignature string and returns its id.
    pub fn subsignature_id(&self, subsignature: &str) -> NumberId {
        self.subsignatures.lock().add(subsignature.to_string())
    }

    pub fn subsignature(&self, id: NumberId) -> Option<String> {
        self.subsignatures.lock().get(id)
    }

    /// Invoke kinds are numbered once, in declaration order.
    pub fn kinds(&self) -> &ArrayNumberer<InvokeKind> {
        &self.kinds
    }

    /// Installs the context numberer. It can only be set once.
    pub fn set_context_numberer(&self, numberer: DynNumberer<str>) -> Result<()> {
        self.contexts
            .set(Mutex::new(numberer))
            .map_err(|_| SceneError::ContextNumbererAlreadySet)
    }

    pub fn contexts(&self) -> Option<MutexGuard<'_, DynNumberer<str>>> {
        self.contexts.get().map(|numberer| numberer.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_numberer_is_idempotent_and_never_reuses_ids() {
        let mut numberer = ArrayNumberer::new();
        let a = Arc::new(ClassDescriptor::new("a.A"));
        let b = Arc::new(ClassDescriptor::new("a.B"));

        let id_a = numberer.add(a.clone());
        assert_eq!(id_a, 1);
        assert_eq!(numberer.add(a.clone()), id_a);
        assert_eq!(numberer.index_of(&a), Some(id_a));

        assert!(numberer.remove(&a));
        assert!(numberer.get(id_a).is_none());
        let id_b = numberer.add(b.clone());
        assert_eq!(id_b, 2);
        assert_eq!(numberer.len(), 1);
        assert!(numberer.get(0).is_none());
    }

    #[test]
    fn weak_numberer_recycles_dropped_slots_with_new_generation() {
        let mut numberer = WeakNumberer::new();
        let a = Arc::new(ClassDescriptor::new("a.A"));
        let keep = Arc::new(ClassDescriptor::new("a.Keep"));

        let id_a = numberer.add(a.clone());
        let id_keep = numberer.add(keep.clone());
        let stale = numberer.handle_of(&a).unwrap();
        assert_eq!(numberer.add(a.clone()), id_a);

        drop(a);
        assert_eq!(numberer.reclaim(), 1);
        assert_eq!(numberer.len(), 1);

        let b = Arc::new(ClassDescriptor::new("a.B"));
        let id_b = numberer.add(b.clone());
        assert_eq!(id_b, id_a);
        assert!(numberer.resolve(stale).is_none());
        let fresh = numberer.handle_of(&b).unwrap();
        assert!(Arc::ptr_eq(&numberer.resolve(fresh).unwrap(), &b));

        assert_eq!(numberer.index_of(&keep), Some(id_keep));
        assert!(Arc::ptr_eq(&numberer.get(id_keep).unwrap(), &keep));
    }

    #[test]
    fn weak_numberer_remove_frees_slot() {
        let mut numberer = WeakNumberer::new();
        let a = Arc::new(LocalDescriptor {
            method: "<a.A: void m()>".to_string(),
            name: "r0".to_string(),
            type_name: "a.A".to_string(),
        });
        let id = numberer.add(a.clone());
        assert!(numberer.remove(&a));
        assert!(!numberer.remove(&a));
        assert!(numberer.get(id).is_none());
        assert_eq!(numberer.index_of(&a), None);
    }

    #[test]
    fn service_numbers_kinds_and_interns_subsignatures() {
        let service = NumbererService::new(false);
        assert_eq!(service.kinds().index_of(&InvokeKind::Invalid), Some(1));
        assert_eq!(service.kinds().index_of(&InvokeKind::Static), Some(2));
        assert_eq!(service.kinds().len(), InvokeKind::ALL.len());

        let id = service.subsignature_id("void main(java.lang.String[])");
        assert_eq!(service.subsignature_id("void main(java.lang.String[])"), id);
        assert_eq!(
            service.subsignature(id).as_deref(),
            Some("void main(java.lang.String[])")
        );
    }

    #[test]
    fn context_numberer_can_only_be_set_once() {
        let service = NumbererService::new(false);
        assert!(service.contexts().is_none());
        service
            .set_context_numberer(Box::new(ArrayNumberer::<Arc<str>>::new()))
            .unwrap();
        let ctx: Arc<str> = Arc::from("ctx-1");
        assert_eq!(service.contexts().unwrap().add(ctx.clone()), 1);

        let err = service
            .set_context_numberer(Box::new(WeakNumberer::<str>::new()))
            .unwrap_err();
        assert!(matches!(err, SceneError::ContextNumbererAlreadySet));
    }
}
