//! End-to-end container scenarios: reference cycles, eager initialization,
//! concurrency and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use wirebox_core::{
    ConstructorArg, Container, ContainerError, Disposable, Initializable, LifecycleCallback,
    PropertySpec, ServiceDefinition,
};

struct Person {
    name: String,
    spouse: Mutex<Option<Arc<Person>>>,
}

impl Person {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spouse: Mutex::new(None),
        }
    }

    fn spouse(&self) -> Option<Arc<Person>> {
        self.spouse.lock().unwrap().clone()
    }
}

fn person_definition(name: &'static str, spouse: &str) -> ServiceDefinition {
    ServiceDefinition::for_type::<Person>()
        .with_factory(move |_| Ok(Person::new(name)))
        .with_property(PropertySpec::reference(
            "spouse",
            spouse,
            |p: &Person, s: Arc<Person>| {
                *p.spouse.lock().unwrap() = Some(s);
            },
        ))
        .build()
}

#[test]
fn singleton_property_cycle_resolves_to_mutual_references() {
    let container = Container::new();
    container
        .register("kerry", person_definition("kerry", "rod"))
        .unwrap();
    container
        .register("rod", person_definition("rod", "kerry"))
        .unwrap();

    let kerry = container.resolve_named::<Person>("kerry").unwrap();
    let rod = container.resolve_named::<Person>("rod").unwrap();

    assert!(Arc::ptr_eq(&kerry.spouse().unwrap(), &rod));
    assert!(Arc::ptr_eq(&rod.spouse().unwrap(), &kerry));
    assert_eq!(kerry.name, "kerry");
    assert_eq!(rod.spouse().unwrap().name, "kerry");
}

#[test]
fn prototype_property_cycle_fails_fast() {
    let container = Container::new();
    container
        .register(
            "kerry",
            ServiceDefinition::for_type::<Person>()
                .prototype()
                .with_factory(|_| Ok(Person::new("kerry")))
                .with_property(PropertySpec::reference(
                    "spouse",
                    "rod",
                    |p: &Person, s: Arc<Person>| *p.spouse.lock().unwrap() = Some(s),
                ))
                .build(),
        )
        .unwrap();
    container
        .register(
            "rod",
            ServiceDefinition::for_type::<Person>()
                .prototype()
                .with_factory(|_| Ok(Person::new("rod")))
                .with_property(PropertySpec::reference(
                    "spouse",
                    "kerry",
                    |p: &Person, s: Arc<Person>| *p.spouse.lock().unwrap() = Some(s),
                ))
                .build(),
        )
        .unwrap();

    let err = container.get("kerry").unwrap_err();
    fn innermost(err: &ContainerError) -> &ContainerError {
        match err {
            ContainerError::UnsatisfiedDependency { source, .. } => innermost(source),
            ContainerError::ServiceCreation {
                source: Some(source),
                ..
            } => innermost(source),
            other => other,
        }
    }
    match innermost(&err) {
        ContainerError::CircularReference { path, .. } => {
            assert!(path.contains("kerry"));
            assert!(path.contains("rod"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn constructor_cycle_fails_even_for_singletons() {
    // constructor injection has no early-reference phase
    let container = Container::new();
    container
        .register(
            "kerry",
            ServiceDefinition::for_type::<Person>()
                .with_constructor_arg(ConstructorArg::reference("rod"))
                .with_factory(|args| {
                    let spouse = args.get::<Person>(0)?;
                    let p = Person::new("kerry");
                    *p.spouse.lock().unwrap() = Some(spouse);
                    Ok(p)
                })
                .build(),
        )
        .unwrap();
    container
        .register(
            "rod",
            ServiceDefinition::for_type::<Person>()
                .with_constructor_arg(ConstructorArg::reference("kerry"))
                .with_factory(|args| {
                    let spouse = args.get::<Person>(0)?;
                    let p = Person::new("rod");
                    *p.spouse.lock().unwrap() = Some(spouse);
                    Ok(p)
                })
                .build(),
        )
        .unwrap();

    let err = container.get("kerry").unwrap_err();
    fn find_circular(err: &ContainerError) -> bool {
        match err {
            ContainerError::CircularReference { .. } => true,
            ContainerError::UnsatisfiedDependency { source, .. } => find_circular(source),
            ContainerError::ServiceCreation {
                source: Some(source),
                ..
            } => find_circular(source),
            _ => false,
        }
    }
    assert!(find_circular(&err), "expected circular reference, got {err}");
}

#[test]
fn large_singleton_ring_initializes_eagerly() {
    // property resolution recurses once per ring member, so run in a
    // thread with a roomy stack
    const RING: usize = 1000;

    let worker = thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let container = Container::new();
            for i in 0..RING {
                let spouse = format!("person{}", (i + 1) % RING);
                container
                    .register(
                        &format!("person{i}"),
                        ServiceDefinition::for_type::<Person>()
                            .with_factory(move |_| Ok(Person::new("ring")))
                            .with_property(PropertySpec::reference(
                                "spouse",
                                spouse,
                                |p: &Person, s: Arc<Person>| {
                                    *p.spouse.lock().unwrap() = Some(s);
                                },
                            ))
                            .build(),
                    )
                    .unwrap();
            }

            container.initialize_singletons().unwrap();

            for i in 0..RING {
                let person = container
                    .resolve_named::<Person>(&format!("person{i}"))
                    .unwrap();
                let next = container
                    .resolve_named::<Person>(&format!("person{}", (i + 1) % RING))
                    .unwrap();
                assert!(Arc::ptr_eq(&person.spouse().unwrap(), &next));
            }
        })
        .unwrap();
    worker.join().unwrap();
}

#[test]
fn concurrent_requests_for_one_singleton_create_it_once() {
    struct Expensive;

    let container = Arc::new(Container::new());
    let creations = Arc::new(AtomicUsize::new(0));

    let counter = creations.clone();
    container
        .register(
            "expensive",
            ServiceDefinition::for_type::<Expensive>()
                .with_factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(10));
                    Ok(Expensive)
                })
                .build(),
        )
        .unwrap();

    let mut workers = Vec::new();
    for _ in 0..8 {
        let container = container.clone();
        workers.push(thread::spawn(move || {
            container.resolve_named::<Expensive>("expensive").unwrap()
        }));
    }
    let instances: Vec<Arc<Expensive>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(creations.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}

#[test]
fn concurrent_registration_removal_and_resolution() {
    struct Worker(#[allow(dead_code)] usize);

    let container = Arc::new(Container::new());
    let mut threads = Vec::new();
    for t in 0..4 {
        let container = container.clone();
        threads.push(thread::spawn(move || {
            for i in 0..50 {
                let name = format!("worker-{t}-{i}");
                container
                    .register(
                        &name,
                        ServiceDefinition::for_type::<Worker>()
                            .with_factory(move |_| Ok(Worker(i)))
                            .build(),
                    )
                    .unwrap();
                container.resolve_named::<Worker>(&name).unwrap();
                if i % 2 == 1 {
                    container.remove_definition(&name).unwrap();
                }
                // name iteration stays usable mid-churn
                let _ = container.definition_names();
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(container.definition_names().len(), 100);
}

#[test]
fn alias_chains_resolve_through_the_container() {
    struct Service;

    let container = Container::new();
    container
        .register(
            "service",
            ServiceDefinition::for_type::<Service>()
                .with_factory(|_| Ok(Service))
                .build(),
        )
        .unwrap();
    container.register_alias("service", "svc").unwrap();
    container.register_alias("svc", "s").unwrap();

    let direct = container.resolve_named::<Service>("service").unwrap();
    let via_chain = container.resolve_named::<Service>("s").unwrap();
    assert!(Arc::ptr_eq(&direct, &via_chain));

    // closing the chain back onto itself is rejected
    let err = container.register_alias("s", "service").unwrap_err();
    assert!(matches!(err, ContainerError::AliasCycle { .. }));
}

#[test]
fn template_inheritance_resolves_end_to_end() {
    #[derive(Default)]
    struct Endpoint {
        timeout_ms: Mutex<u64>,
        host: Mutex<String>,
    }

    let container = Container::new();
    container
        .register(
            "endpoint-defaults",
            ServiceDefinition::template()
                .with_property(PropertySpec::value(
                    "timeout_ms",
                    5_000u64,
                    |e: &Endpoint, v: u64| *e.timeout_ms.lock().unwrap() = v,
                ))
                .build(),
        )
        .unwrap();
    container
        .register(
            "billing-endpoint",
            ServiceDefinition::for_type::<Endpoint>()
                .with_parent("endpoint-defaults")
                .with_factory(|_| Ok(Endpoint::default()))
                .with_property(PropertySpec::value(
                    "host",
                    "billing.internal".to_string(),
                    |e: &Endpoint, v: String| *e.host.lock().unwrap() = v,
                ))
                .build(),
        )
        .unwrap();

    // the template itself is not a service
    assert!(container.get("endpoint-defaults").is_err());

    let endpoint = container.resolve_named::<Endpoint>("billing-endpoint").unwrap();
    assert_eq!(*endpoint.timeout_ms.lock().unwrap(), 5_000);
    assert_eq!(*endpoint.host.lock().unwrap(), "billing.internal");
}

#[test]
fn shutdown_disposes_dependents_before_dependencies() {
    struct Db;
    struct Pool;
    struct Api;

    let order = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let log = order.clone();
    container
        .register(
            "db",
            ServiceDefinition::for_type::<Db>()
                .with_factory(|_| Ok(Db))
                .with_destroyer(LifecycleCallback::new("close", move |_: &Db| {
                    log.lock().unwrap().push("db");
                    Ok(())
                }))
                .build(),
        )
        .unwrap();
    let log = order.clone();
    container
        .register(
            "pool",
            ServiceDefinition::for_type::<Pool>()
                .depends_on("db")
                .with_factory(|_| Ok(Pool))
                .with_destroyer(LifecycleCallback::new("close", move |_: &Pool| {
                    log.lock().unwrap().push("pool");
                    Ok(())
                }))
                .build(),
        )
        .unwrap();
    let log = order.clone();
    container
        .register(
            "api",
            ServiceDefinition::for_type::<Api>()
                .depends_on("pool")
                .with_factory(|_| Ok(Api))
                .with_destroyer(LifecycleCallback::new("close", move |_: &Api| {
                    log.lock().unwrap().push("api");
                    Ok(())
                }))
                .build(),
        )
        .unwrap();

    container.initialize_singletons().unwrap();
    let failures = container.shutdown().unwrap();
    assert!(failures.is_empty());
    assert_eq!(*order.lock().unwrap(), vec!["api", "pool", "db"]);
}

#[test]
fn initializable_and_disposable_contracts_run() {
    struct Listener {
        started: AtomicUsize,
        stopped: Arc<AtomicUsize>,
    }

    impl Initializable for Listener {
        fn initialize(&self) -> Result<(), ContainerError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Disposable for Listener {
        fn dispose(&self) -> Result<(), ContainerError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let stopped = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let stop_counter = stopped.clone();
    container
        .register(
            "listener",
            ServiceDefinition::for_type::<Listener>()
                .with_factory(move |_| {
                    Ok(Listener {
                        started: AtomicUsize::new(0),
                        stopped: stop_counter.clone(),
                    })
                })
                .initializable::<Listener>()
                .disposable::<Listener>()
                .build(),
        )
        .unwrap();

    let listener = container.resolve_named::<Listener>("listener").unwrap();
    assert_eq!(listener.started.load(Ordering::SeqCst), 1);
    assert_eq!(stopped.load(Ordering::SeqCst), 0);

    let failures = container.shutdown().unwrap();
    assert!(failures.is_empty());
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_singleton_creation_is_retryable_after_fix() {
    struct Flaky;

    let attempts = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = attempts.clone();
    container
        .register(
            "flaky",
            ServiceDefinition::for_type::<Flaky>()
                .with_factory(move |_| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ContainerError::illegal_state("transient failure"))
                    } else {
                        Ok(Flaky)
                    }
                })
                .build(),
        )
        .unwrap();

    assert!(container.get("flaky").is_err());
    assert!(container.get("flaky").is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
