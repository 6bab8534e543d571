use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Runtime-comparable descriptor of a `(state, event, output)` triple. This is the key the
/// pool's launcher map is stored under; the typed facade is [`WorkflowType`].
#[derive(Clone, Copy)]
pub(crate) struct ErasedType {
    state: TypeId,
    event: TypeId,
    output: TypeId,
    names: [&'static str; 3],
}

impl ErasedType {
    fn of<S: 'static, E: 'static, O: 'static>() -> Self {
        Self {
            state: TypeId::of::<S>(),
            event: TypeId::of::<E>(),
            output: TypeId::of::<O>(),
            names: [type_name::<S>(), type_name::<E>(), type_name::<O>()],
        }
    }
}

impl PartialEq for ErasedType {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.event == other.event && self.output == other.output
    }
}

impl Eq for ErasedType {}

impl Hash for ErasedType {
    fn hash<H: Hasher>(&self, h: &mut H) {
        self.state.hash(h);
        self.event.hash(h);
        self.output.hash(h);
    }
}

impl fmt::Display for ErasedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s, e, o] = self.names;
        write!(f, "<{s}, {e}, {o}>")
    }
}

impl fmt::Debug for ErasedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Key of the live-instance map.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ErasedId {
    pub(crate) ty: ErasedType,
    pub(crate) name: String,
}

impl fmt::Display for ErasedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.ty)
        } else {
            write!(f, "{}#{}", self.ty, self.name)
        }
    }
}

/// The type of a workflow: its state, event and output types.
///
/// Two `WorkflowType`s are equal iff all three types match. The value carries no data, it
/// only pins the three type parameters so launchers and ids can be checked at compile time.
pub struct WorkflowType<S, E, O> {
    erased: ErasedType,
    _marker: PhantomData<fn() -> (S, E, O)>,
}

impl<S: 'static, E: 'static, O: 'static> WorkflowType<S, E, O> {
    pub fn new() -> Self {
        Self {
            erased: ErasedType::of::<S, E, O>(),
            _marker: PhantomData,
        }
    }

    /// Id of one instance of this type. Only needed when several instances of the same
    /// type have to run side by side; otherwise use [`WorkflowType::default_id`].
    pub fn make_id(&self, name: impl Into<String>) -> WorkflowId<S, E, O> {
        WorkflowId {
            ty: self.clone(),
            name: name.into(),
        }
    }

    pub fn default_id(&self) -> WorkflowId<S, E, O> {
        self.make_id("")
    }
}

impl<S, E, O> WorkflowType<S, E, O> {
    pub(crate) fn erased(&self) -> ErasedType {
        self.erased
    }
}

impl<S: 'static, E: 'static, O: 'static> Default for WorkflowType<S, E, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E, O> Clone for WorkflowType<S, E, O> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased,
            _marker: PhantomData,
        }
    }
}

impl<S, E, O> PartialEq for WorkflowType<S, E, O> {
    fn eq(&self, other: &Self) -> bool {
        self.erased == other.erased
    }
}

impl<S, E, O> Eq for WorkflowType<S, E, O> {}

impl<S, E, O> Hash for WorkflowType<S, E, O> {
    fn hash<H: Hasher>(&self, h: &mut H) {
        self.erased.hash(h);
    }
}

impl<S, E, O> fmt::Debug for WorkflowType<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkflowType{}", self.erased)
    }
}

impl<S, E, O> fmt::Display for WorkflowType<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.erased, f)
    }
}

/// Identifies one workflow instance in a [`WorkflowPool`](crate::WorkflowPool): a type plus a
/// name. The default name is the empty string.
pub struct WorkflowId<S, E, O> {
    ty: WorkflowType<S, E, O>,
    name: String,
}

impl<S, E, O> WorkflowId<S, E, O> {
    pub fn workflow_type(&self) -> &WorkflowType<S, E, O> {
        &self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn erased(&self) -> ErasedId {
        ErasedId {
            ty: self.ty.erased(),
            name: self.name.clone(),
        }
    }
}

impl<S, E, O> Clone for WorkflowId<S, E, O> {
    fn clone(&self) -> Self {
        Self {
            ty: self.ty.clone(),
            name: self.name.clone(),
        }
    }
}

impl<S, E, O> PartialEq for WorkflowId<S, E, O> {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.name == other.name
    }
}

impl<S, E, O> Eq for WorkflowId<S, E, O> {}

impl<S, E, O> Hash for WorkflowId<S, E, O> {
    fn hash<H: Hasher>(&self, h: &mut H) {
        self.ty.hash(h);
        self.name.hash(h);
    }
}

impl<S, E, O> fmt::Debug for WorkflowId<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowId")
            .field("type", &self.ty.erased)
            .field("name", &self.name)
            .finish()
    }
}

impl<S, E, O> fmt::Display for WorkflowId<S, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.erased(), f)
    }
}
