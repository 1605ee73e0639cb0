use ena::undo_log::Rollback;

/// A captured field of `E`, read through `get` and restored through `set`.
pub struct Field<E, V> {
    pub name: &'static str,
    pub get: fn(&E) -> &V,
    pub set: fn(&mut E, V),
}

/// A nested entity reachable from `E`, kept by its own [`StateKeeper`].
pub struct Projection<E, S> {
    pub name: &'static str,
    pub get: fn(&E) -> Option<&S>,
    pub get_mut: fn(&mut E) -> Option<&mut S>,
}

/// Declarative description of which parts of an `E` a transformation may
/// touch. `C` is read-only context available while capturing.
pub struct StateKeeper<E, C> {
    provider: fn(&E, &C, &mut StateKeeperScope<'_, E, C>),
}

impl<E: 'static, C> StateKeeper<E, C> {
    pub const fn new(provider: fn(&E, &C, &mut StateKeeperScope<'_, E, C>)) -> StateKeeper<E, C> {
        StateKeeper { provider }
    }

    pub fn prepare(&self, entity: &E, context: &C) -> PreservedState<E> {
        let mut scope = StateKeeperScope {
            context,
            log: Vec::new(),
        };
        (self.provider)(entity, context, &mut scope);
        PreservedState { log: scope.log }
    }
}

pub struct StateKeeperScope<'c, E, C> {
    context: &'c C,
    log: Vec<KeeperUndo<E>>,
}

impl<E: 'static, C> StateKeeperScope<'_, E, C> {
    pub fn context(&self) -> &C {
        self.context
    }

    /// Captures `field` as it is now.
    pub fn add<V: Clone + Send + 'static>(&mut self, entity: &E, field: Field<E, V>) {
        self.log.push(KeeperUndo::new(FieldEntry {
            name: field.name,
            set: field.set,
            previous: Some((field.get)(entity).clone()),
            arranged: None,
        }));
    }

    /// Captures `field` and, once the state is arranged, replaces it with the
    /// value produced by `arrange`.
    pub fn add_arranged<V: Clone + Send + 'static>(
        &mut self,
        entity: &E,
        field: Field<E, V>,
        arrange: fn(&V, &E, &C) -> V,
    ) {
        let current = (field.get)(entity);
        let arranged = arrange(current, entity, self.context);
        self.log.push(KeeperUndo::new(FieldEntry {
            name: field.name,
            set: field.set,
            previous: Some(current.clone()),
            arranged: Some(arranged),
        }));
    }

    /// Applies `keeper` to the nested entity behind `projection`, if present.
    pub fn entity<S: 'static>(
        &mut self,
        entity: &E,
        projection: Projection<E, S>,
        keeper: &StateKeeper<S, C>,
    ) {
        let Some(nested) = (projection.get)(entity) else {
            return;
        };
        let state = keeper.prepare(nested, self.context);
        if state.is_empty() {
            return;
        }
        self.log.push(KeeperUndo::new(NestedEntry {
            name: projection.name,
            get_mut: projection.get_mut,
            state: Some(state),
        }));
    }
}

trait KeeperEntry<E>: Send {
    fn name(&self) -> &'static str;
    fn arrange(&mut self, entity: &mut E);
    fn restore(&mut self, entity: &mut E);
}

struct FieldEntry<E, V> {
    name: &'static str,
    set: fn(&mut E, V),
    previous: Option<V>,
    arranged: Option<V>,
}

impl<E, V: Send> KeeperEntry<E> for FieldEntry<E, V> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn arrange(&mut self, entity: &mut E) {
        if let Some(value) = self.arranged.take() {
            (self.set)(entity, value);
        }
    }

    fn restore(&mut self, entity: &mut E) {
        if let Some(value) = self.previous.take() {
            (self.set)(entity, value);
        }
    }
}

struct NestedEntry<E, S> {
    name: &'static str,
    get_mut: fn(&mut E) -> Option<&mut S>,
    state: Option<PreservedState<S>>,
}

impl<E, S: 'static> KeeperEntry<E> for NestedEntry<E, S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn arrange(&mut self, entity: &mut E) {
        if let (Some(state), Some(nested)) = (self.state.as_mut(), (self.get_mut)(entity)) {
            state.arrange(nested);
        }
    }

    fn restore(&mut self, entity: &mut E) {
        let Some(state) = self.state.take() else {
            return;
        };
        if let Some(nested) = (self.get_mut)(entity) {
            state.restore(nested);
        }
    }
}

// a single undoable capture
struct KeeperUndo<E>(Box<dyn KeeperEntry<E>>);

impl<E> KeeperUndo<E> {
    fn new(entry: impl KeeperEntry<E> + 'static) -> KeeperUndo<E> {
        KeeperUndo(Box::new(entry))
    }
}

struct Restorer<'e, E>(&'e mut E);

impl<E> Rollback<KeeperUndo<E>> for Restorer<'_, E> {
    fn reverse(&mut self, mut undo: KeeperUndo<E>) {
        tracing::trace!(field = undo.0.name(), "restoring");
        undo.0.restore(self.0);
    }
}

/// Values captured by [`StateKeeper::prepare`], valid for one transformation.
pub struct PreservedState<E> {
    log: Vec<KeeperUndo<E>>,
}

impl<E> PreservedState<E> {
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Writes the arranged values, in capture order.
    pub fn arrange(&mut self, entity: &mut E) {
        for undo in &mut self.log {
            undo.0.arrange(entity);
        }
    }

    /// Puts back every captured value, last capture first.
    pub fn restore(self, entity: &mut E) {
        let mut restorer = Restorer(entity);
        for undo in self.log.into_iter().rev() {
            restorer.reverse(undo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Inner {
        value: Vec<u32>,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Outer {
        label: String,
        count: u32,
        inner: Option<Inner>,
    }

    const LABEL: Field<Outer, String> = Field {
        name: "label",
        get: |outer| &outer.label,
        set: |outer, label| outer.label = label,
    };

    const COUNT: Field<Outer, u32> = Field {
        name: "count",
        get: |outer| &outer.count,
        set: |outer, count| outer.count = count,
    };

    const INNER: Projection<Outer, Inner> = Projection {
        name: "inner",
        get: |outer| outer.inner.as_ref(),
        get_mut: |outer| outer.inner.as_mut(),
    };

    const VALUE: Field<Inner, Vec<u32>> = Field {
        name: "value",
        get: |inner| &inner.value,
        set: |inner, value| inner.value = value,
    };

    static INNER_KEEPER: StateKeeper<Inner, u32> = StateKeeper::new(|inner, _, scope| {
        scope.add_arranged(inner, VALUE, |value, _, offset| {
            value.iter().map(|v| v + offset).collect()
        });
    });

    static OUTER_KEEPER: StateKeeper<Outer, u32> = StateKeeper::new(|outer, _, scope| {
        scope.add(outer, LABEL);
        scope.add(outer, COUNT);
        scope.entity(outer, INNER, &INNER_KEEPER);
    });

    fn sample() -> Outer {
        Outer {
            label: "before".into(),
            count: 1,
            inner: Some(Inner {
                value: vec![1, 2],
            }),
        }
    }

    #[test]
    fn test_restore_undoes_arbitrary_mutation() {
        let mut outer = sample();
        let original = outer.clone();
        let state = OUTER_KEEPER.prepare(&outer, &0);
        assert_eq!(state.len(), 3);

        outer.label = "after".into();
        outer.count = 42;
        outer.inner.as_mut().unwrap().value.push(3);
        state.restore(&mut outer);

        assert_eq!(outer, original);
    }

    #[test]
    fn test_arrange_then_restore() {
        let mut outer = sample();
        let original = outer.clone();
        let mut state = OUTER_KEEPER.prepare(&outer, &10);

        state.arrange(&mut outer);
        assert_eq!(outer.inner.as_ref().unwrap().value, vec![11, 12]);
        assert_eq!(outer.label, "before");

        state.restore(&mut outer);
        assert_eq!(outer, original);
    }

    #[test]
    fn test_restore_without_mutation_is_identity() {
        let mut outer = sample();
        let original = outer.clone();
        OUTER_KEEPER.prepare(&outer, &0).restore(&mut outer);
        assert_eq!(outer, original);
    }

    #[test]
    fn test_absent_nested_entity_is_skipped() {
        let mut outer = sample();
        outer.inner = None;
        let state = OUTER_KEEPER.prepare(&outer, &0);
        assert_eq!(state.len(), 2);
    }
}
