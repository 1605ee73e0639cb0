use phasec_error::{ResolveError, ResolveResult};
use phasec_keeper::KeeperGuard;
use phasec_lock::CancellationToken;
use phasec_resolve::{
    ContextCollector, LazyResolver, LazyResolverRegistry, LazyResolverRegistryBuilder, ResolveCx,
    ResolveSession, ScopeSnapshot, SessionConfig,
    phases::{StatusResolver, TypesResolver},
};
use phasec_tree::{
    NodeId, ResolvePhase, Tree, TreeBuilder,
    fields::{DeclarationFields, Expression, StatementFields, TypeRefFields, TypeRefState},
    node::{ClassKind, NodeTag, StatementKind},
    visit::Ownership,
};
use std::{
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

struct Fixture {
    tree: Tree,
    class: NodeId,
    function: NodeId,
    statements: [NodeId; 2],
}

/// `class C(p: Int) { fun f(): Int { val a = p; return a } }`
fn fixture() -> Fixture {
    let mut builder = TreeBuilder::new();
    let file = builder.file("main.kt", "app");
    let class = builder.class(file, "C", ClassKind::Class);
    builder.value_parameter(class, "p", "Int");
    let function = builder.function(class, "f", Some("Int"));
    let first = builder.statement(
        function,
        StatementKind::LocalVariable { name: "a".into() },
        Expression::access("p"),
    );
    let second = builder.statement(function, StatementKind::Return, Expression::access("a"));
    Fixture {
        tree: builder.finish(),
        class,
        function,
        statements: [first, second],
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        verify: true,
        ..SessionConfig::default()
    }
}

fn statement_types(tree: &Tree, statements: &[NodeId]) -> Vec<bool> {
    statements
        .iter()
        .map(|&statement| tree.entity::<StatementFields>(statement).unwrap().ty.is_some())
        .collect()
}

/// Records every target it transforms.
struct Counting<R> {
    inner: R,
    seen: Arc<Mutex<Vec<NodeId>>>,
}

impl<R: LazyResolver> LazyResolver for Counting<R> {
    fn phase(&self) -> ResolvePhase {
        self.inner.phase()
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        self.inner.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        self.seen.lock().unwrap().push(target);
        thread::sleep(Duration::from_millis(2));
        self.inner.transform(cx, target)
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        self.inner.check_is_resolved(tree, target)
    }
}

/// Fails once, after the inner transformation already wrote its results.
struct FailOnce<R> {
    inner: R,
    armed: Arc<AtomicBool>,
}

impl<R: LazyResolver> LazyResolver for FailOnce<R> {
    fn phase(&self) -> ResolvePhase {
        self.inner.phase()
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        self.inner.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        self.inner.transform(cx, target)?;
        if cx.tree().node(target).tag() == NodeTag::Function && self.armed.swap(false, Ordering::SeqCst) {
            return Err(ResolveError::Fault {
                node: target,
                phase: self.phase(),
                message: "injected".to_string(),
            });
        }
        Ok(())
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        self.inner.check_is_resolved(tree, target)
    }
}

/// Type references in the header of `target`, in walk order.
fn header_type_refs(tree: &Tree, target: NodeId) -> Vec<NodeId> {
    tree.owned_elements(target, Ownership::HEADER)
        .into_iter()
        .filter(|&element| tree.node(element).tag() == NodeTag::TypeRef)
        .collect()
}

/// Runs the inner transformation, then leaves the last header type
/// reference unresolved.
struct ForgetsLast<R> {
    inner: R,
}

impl<R: LazyResolver> LazyResolver for ForgetsLast<R> {
    fn phase(&self) -> ResolvePhase {
        self.inner.phase()
    }

    fn preserve<'t>(&self, tree: &'t Tree, target: NodeId) -> KeeperGuard<'t> {
        self.inner.preserve(tree, target)
    }

    fn transform(&self, cx: &ResolveCx<'_>, target: NodeId) -> ResolveResult<()> {
        self.inner.transform(cx, target)?;
        if let Some(&last) = header_type_refs(cx.tree(), target).last() {
            cx.tree()
                .with_fields_mut(last, |type_ref: &mut TypeRefFields| type_ref.ty = TypeRefState::Unresolved);
        }
        Ok(())
    }

    fn check_is_resolved(&self, tree: &Tree, target: NodeId) -> ResolveResult<()> {
        self.inner.check_is_resolved(tree, target)
    }
}

/// Panics on the n-th body statement it sees.
struct PanicAt {
    calls: AtomicUsize,
    at: usize,
}

impl ContextCollector for PanicAt {
    fn collect(&self, phase: ResolvePhase, _snapshot: &ScopeSnapshot) {
        if phase == ResolvePhase::BodyResolve && self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.at {
            panic!("collector failed");
        }
    }
}

/// Cancels `token` as soon as body resolution starts.
struct CancelOnBody {
    token: CancellationToken,
}

impl ContextCollector for CancelOnBody {
    fn collect(&self, phase: ResolvePhase, _snapshot: &ScopeSnapshot) {
        if phase == ResolvePhase::BodyResolve {
            self.token.cancel();
        }
    }
}

#[test]
fn test_concurrent_requests_transform_once() {
    let Fixture { tree, function, .. } = fixture();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = LazyResolverRegistryBuilder::standard()
        .replace(Counting {
            inner: TypesResolver,
            seen: Arc::clone(&seen),
        })
        .build()
        .unwrap();
    let session = ResolveSession::new(Arc::new(tree), registry, config());
    let barrier = Barrier::new(8);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                barrier.wait();
                session.resolve(function, ResolvePhase::BodyResolve).unwrap();
            });
        }
    });

    let mut seen = seen.lock().unwrap().clone();
    let total = seen.len();
    seen.sort();
    seen.dedup();
    assert_eq!(total, seen.len());
    assert!(seen.contains(&function));
    assert_eq!(session.tree().phase(function), ResolvePhase::BodyResolve);
    assert_eq!(session.locks().waiting_count(), 0);
}

#[test]
fn test_failed_transform_is_rolled_back() {
    let Fixture { tree, function, .. } = fixture();
    let armed = Arc::new(AtomicBool::new(true));
    let registry = LazyResolverRegistryBuilder::standard()
        .replace(FailOnce {
            inner: StatusResolver,
            armed: Arc::clone(&armed),
        })
        .build()
        .unwrap();
    let session = ResolveSession::new(Arc::new(tree), registry, config());
    let tree = session.tree();

    let error = session.resolve(function, ResolvePhase::Status).unwrap_err();
    assert!(matches!(error, ResolveError::Fault { node, .. } if node == function));
    assert_eq!(tree.phase(function), ResolvePhase::Types);
    assert_eq!(tree.entity::<DeclarationFields>(function).unwrap().status, None);
    assert!(!session.locks().is_locked(function));

    session.resolve(function, ResolvePhase::Status).unwrap();
    assert_eq!(tree.phase(function), ResolvePhase::Status);
    assert!(tree.entity::<DeclarationFields>(function).unwrap().status.is_some());
}

#[test]
fn test_panicking_collector_becomes_a_fault() {
    let Fixture {
        tree,
        function,
        statements,
        ..
    } = fixture();
    let collector = Arc::new(PanicAt {
        calls: AtomicUsize::new(0),
        at: 2,
    });
    let session = ResolveSession::new(Arc::new(tree), LazyResolverRegistry::standard(), config())
        .with_collector(collector);
    let tree = session.tree();

    let error = session.resolve(function, ResolvePhase::BodyResolve).unwrap_err();
    let (node, message) = match error {
        ResolveError::Fault { node, message, .. } => (node, message),
        other => panic!("expected a fault, got {other}"),
    };
    assert_eq!(node, function);
    assert_eq!(message, "collector failed");
    // the first statement had been typed before the panic
    assert_eq!(statement_types(tree, &statements), vec![false, false]);
    assert_eq!(tree.phase(function), ResolvePhase::Status);
    assert!(!session.locks().is_locked(function));

    session.resolve(function, ResolvePhase::BodyResolve).unwrap();
    assert_eq!(statement_types(tree, &statements), vec![true, true]);
}

#[test]
fn test_cancellation_during_transform() {
    let Fixture {
        tree,
        function,
        statements,
        ..
    } = fixture();
    let token = CancellationToken::new();
    let collector = Arc::new(CancelOnBody { token: token.clone() });
    let session = ResolveSession::new(Arc::new(tree), LazyResolverRegistry::standard(), config())
        .with_collector(collector);
    let tree = session.tree();

    let error = session
        .resolve_cancellable(function, ResolvePhase::BodyResolve, &token)
        .unwrap_err();
    assert!(matches!(error, ResolveError::Cancelled { node, .. } if node == function));
    assert_eq!(statement_types(tree, &statements), vec![false, false]);
    assert_eq!(tree.phase(function), ResolvePhase::Status);

    session.resolve(function, ResolvePhase::BodyResolve).unwrap();
    assert_eq!(statement_types(tree, &statements), vec![true, true]);
}

#[test]
fn test_cancellation_while_waiting_for_a_lock() {
    let Fixture { tree, class, .. } = fixture();
    let session = ResolveSession::new(Arc::new(tree), LazyResolverRegistry::standard(), config());
    let token = CancellationToken::new();

    let guard = session
        .locks()
        .acquire(class, ResolvePhase::Imports, &CancellationToken::new())
        .unwrap();
    thread::scope(|scope| {
        let waiter = scope.spawn(|| session.resolve_cancellable(class, ResolvePhase::Imports, &token));
        while session.locks().waiting_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        token.cancel();
        let error = waiter.join().unwrap().unwrap_err();
        assert!(matches!(error, ResolveError::Cancelled { node, .. } if node == class));
    });
    drop(guard);

    assert_eq!(session.tree().phase(class), ResolvePhase::Raw);
    session.resolve(class, ResolvePhase::Imports).unwrap();
    assert_eq!(session.tree().phase(class), ResolvePhase::Imports);
}

/// `fun g(a: Int, b: String): Int`, typed by a resolver that forgets one reference.
fn forgetful_session(verify: bool) -> (ResolveSession, NodeId) {
    let mut builder = TreeBuilder::new();
    let file = builder.file("main.kt", "app");
    let function = builder.function(file, "g", Some("Int"));
    builder.value_parameter(function, "a", "Int");
    builder.value_parameter(function, "b", "String");
    let registry = LazyResolverRegistryBuilder::standard()
        .replace(ForgetsLast { inner: TypesResolver })
        .build()
        .unwrap();
    let config = SessionConfig {
        verify,
        ..SessionConfig::default()
    };
    (ResolveSession::new(Arc::new(builder.finish()), registry, config), function)
}

#[test]
fn test_consistency_violation_is_rolled_back() {
    let (session, function) = forgetful_session(true);
    let tree = session.tree();
    let type_refs = header_type_refs(tree, function);
    assert_eq!(type_refs.len(), 3);
    let forgotten = *type_refs.last().unwrap();

    let error = session.resolve(function, ResolvePhase::Types).unwrap_err();
    match error {
        ResolveError::ConsistencyViolation {
            node,
            kind,
            span,
            phase,
            expected,
            found,
        } => {
            assert_eq!(node, forgotten);
            assert_eq!(kind, NodeTag::TypeRef);
            assert_eq!(span, tree.node(forgotten).span);
            assert_eq!(phase, ResolvePhase::Types);
            assert_eq!(expected, "explicit type references resolved");
            assert!(found.contains("Unresolved"), "{found}");
        }
        other => panic!("expected a consistency violation, got {other:?}"),
    }

    assert_eq!(tree.phase(function), ResolvePhase::AnnotationArguments);
    for &type_ref in &type_refs {
        assert_eq!(
            tree.entity::<TypeRefFields>(type_ref).unwrap().ty,
            TypeRefState::Unresolved
        );
    }
    assert_eq!(session.locks().waiting_count(), 0);
}

#[test]
fn test_unverified_session_publishes_the_phase() {
    let (session, function) = forgetful_session(false);
    let tree = session.tree();
    let type_refs = header_type_refs(tree, function);

    session.resolve(function, ResolvePhase::Types).unwrap();

    assert_eq!(tree.phase(function), ResolvePhase::Types);
    let (forgotten, resolved) = type_refs.split_last().unwrap();
    assert_eq!(
        tree.entity::<TypeRefFields>(*forgotten).unwrap().ty,
        TypeRefState::Unresolved
    );
    for &type_ref in resolved {
        assert!(!matches!(
            tree.entity::<TypeRefFields>(type_ref).unwrap().ty,
            TypeRefState::Unresolved
        ));
    }
}
