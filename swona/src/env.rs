//! Static environments: compile-time name resolution
//!
//! A chain of lexical scopes maps names to [`Binding`]s. The root of every
//! chain is the [`GlobalStaticEnvironment`]. Its `new_scope` starts a
//! [`LocalFrame`], whose own nested scopes are [`LocalFrameChildScope`]s that
//! share the frame's slot sequence: a child scope may shadow a name, but the
//! shadowing binding still gets a fresh slot in the same frame.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use thiserror::Error;

use crate::error::Error;
use crate::types::Type;

/// Where a variable lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Slot in the global data segment
    Global,
    /// Slot in the current frame, after the arguments and return address
    Local,
    /// Function argument
    Argument,
}

/// Statically known information about a variable
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    pub name: String,
    pub ty: Type,
    pub index: usize,
    pub mutable: bool,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BindingKind::Global => "Global",
            BindingKind::Local => "Local",
            BindingKind::Argument => "Argument",
        };
        write!(f, "[{} {} ({})]", kind, self.index, self.name)
    }
}

/// Unique identity of a binding within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

/// Handle to a binding. Two references are equal only if they were produced
/// by the same `bind`, even if the bindings look alike.
#[derive(Debug, Clone)]
pub struct BindingReference {
    id: BindingId,
    binding: Rc<Binding>,
}

impl BindingReference {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn ty(&self) -> &Type {
        &self.binding.ty
    }

    pub fn kind(&self) -> BindingKind {
        self.binding.kind
    }

    pub fn index(&self) -> usize {
        self.binding.index
    }

    pub fn mutable(&self) -> bool {
        self.binding.mutable
    }
}

impl PartialEq for BindingReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BindingReference {}

impl Hash for BindingReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for BindingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binding)
    }
}

/// A name was bound twice in the same scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("variable already bound: {0}")]
pub struct AlreadyBound(pub String);

impl From<AlreadyBound> for Error {
    fn from(err: AlreadyBound) -> Self {
        Error::AlreadyBound(err.0)
    }
}

/// Mapping from variable names to bindings
pub trait StaticEnvironment {
    /// Find the binding of `name` in this scope or any enclosing one.
    fn lookup(&self, name: &str) -> Option<BindingReference>;

    /// Create a binding in this scope. Fails if `name` is already bound in
    /// this exact scope; shadowing an outer binding is fine.
    fn bind(&mut self, name: &str, ty: Type, mutable: bool)
        -> Result<BindingReference, AlreadyBound>;

    /// Nested scope whose bindings are invisible once it is dropped.
    fn new_scope(&self) -> Box<dyn StaticEnvironment + '_>;
}

/// Names bound directly in one scope
#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, BindingReference>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<BindingReference> {
        self.bindings.get(name).cloned()
    }

    fn insert(
        &mut self,
        ids: &Cell<u32>,
        name: &str,
        make: impl FnOnce() -> Binding,
    ) -> Result<BindingReference, AlreadyBound> {
        if self.bindings.contains_key(name) {
            return Err(AlreadyBound(name.to_string()));
        }
        let reference = new_reference(ids, make());
        self.bindings.insert(name.to_string(), reference.clone());
        Ok(reference)
    }
}

fn new_reference(ids: &Cell<u32>, binding: Binding) -> BindingReference {
    let id = ids.get();
    ids.set(id + 1);
    BindingReference {
        id: BindingId(id),
        binding: Rc::new(binding),
    }
}

/// The root environment. Bindings made here live in the global data segment.
#[derive(Debug)]
pub struct GlobalStaticEnvironment {
    scope: Scope,
    next_index: usize,
    ids: Rc<Cell<u32>>,
}

impl Default for GlobalStaticEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalStaticEnvironment {
    pub fn new() -> Self {
        Self {
            scope: Scope::default(),
            next_index: 0,
            ids: Rc::new(Cell::new(0)),
        }
    }

    /// Frame for a function body with `args` pre-bound as immutable arguments
    /// at indices `0..args.len()`.
    pub fn new_function_scope(&self, args: &[(String, Type)]) -> LocalFrame<'_> {
        let mut frame = LocalFrame::new(self, self.ids.clone());
        for (index, (name, ty)) in args.iter().enumerate() {
            let reference = new_reference(
                &self.ids,
                Binding {
                    kind: BindingKind::Argument,
                    name: name.clone(),
                    ty: ty.clone(),
                    index,
                    mutable: false,
                },
            );
            frame.scope.bindings.insert(name.clone(), reference);
        }
        frame
    }

    /// Forget the name. The slot it used stays allocated.
    pub fn unbind(&mut self, name: &str) -> Option<BindingReference> {
        self.scope.bindings.remove(name)
    }

    pub fn binding_names(&self) -> BTreeSet<String> {
        self.scope.bindings.keys().cloned().collect()
    }
}

impl StaticEnvironment for GlobalStaticEnvironment {
    fn lookup(&self, name: &str) -> Option<BindingReference> {
        self.scope.get(name)
    }

    fn bind(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> Result<BindingReference, AlreadyBound> {
        let index = self.next_index;
        let reference = self.scope.insert(&self.ids, name, || Binding {
            kind: BindingKind::Global,
            name: name.to_string(),
            ty,
            index,
            mutable,
        })?;
        self.next_index += 1;
        Ok(reference)
    }

    fn new_scope(&self) -> Box<dyn StaticEnvironment + '_> {
        Box::new(LocalFrame::new(self, self.ids.clone()))
    }
}

/// Top-level scope of a frame
pub struct LocalFrame<'a> {
    parent: &'a dyn StaticEnvironment,
    scope: Scope,
    slots: Rc<Cell<usize>>,
    ids: Rc<Cell<u32>>,
}

impl<'a> LocalFrame<'a> {
    fn new(parent: &'a dyn StaticEnvironment, ids: Rc<Cell<u32>>) -> Self {
        Self {
            parent,
            scope: Scope::default(),
            slots: Rc::new(Cell::new(0)),
            ids,
        }
    }
}

fn bind_local(
    scope: &mut Scope,
    slots: &Cell<usize>,
    ids: &Cell<u32>,
    name: &str,
    ty: Type,
    mutable: bool,
) -> Result<BindingReference, AlreadyBound> {
    let index = slots.get();
    let reference = scope.insert(ids, name, || Binding {
        kind: BindingKind::Local,
        name: name.to_string(),
        ty,
        index,
        mutable,
    })?;
    slots.set(index + 1);
    Ok(reference)
}

impl StaticEnvironment for LocalFrame<'_> {
    fn lookup(&self, name: &str) -> Option<BindingReference> {
        self.scope.get(name).or_else(|| self.parent.lookup(name))
    }

    fn bind(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> Result<BindingReference, AlreadyBound> {
        bind_local(&mut self.scope, &self.slots, &self.ids, name, ty, mutable)
    }

    fn new_scope(&self) -> Box<dyn StaticEnvironment + '_> {
        Box::new(LocalFrameChildScope {
            parent: self,
            scope: Scope::default(),
            slots: self.slots.clone(),
            ids: self.ids.clone(),
        })
    }
}

/// Nested scope sharing the slots of its enclosing frame
pub struct LocalFrameChildScope<'a> {
    parent: &'a dyn StaticEnvironment,
    scope: Scope,
    slots: Rc<Cell<usize>>,
    ids: Rc<Cell<u32>>,
}

impl StaticEnvironment for LocalFrameChildScope<'_> {
    fn lookup(&self, name: &str) -> Option<BindingReference> {
        self.scope.get(name).or_else(|| self.parent.lookup(name))
    }

    fn bind(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> Result<BindingReference, AlreadyBound> {
        bind_local(&mut self.scope, &self.slots, &self.ids, name, ty, mutable)
    }

    fn new_scope(&self) -> Box<dyn StaticEnvironment + '_> {
        Box::new(LocalFrameChildScope {
            parent: self,
            scope: Scope::default(),
            slots: self.slots.clone(),
            ids: self.ids.clone(),
        })
    }
}
