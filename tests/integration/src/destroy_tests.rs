//! Destroy Tests - Adapter Teardown With Concurrent Callers
//!
//! These tests exercise the destroy protocol:
//! - Concurrent destroys run a single teardown with the first caller's flag
//! - Calls into an adapter destroyed mid-invocation fail instead of blocking
//! - Teardown drains in-flight invocations
//! - Requests racing a destroy are retried against a recreated adapter
//! - Callbacks dispatching into an adapter being destroyed fail fast

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use integration_tests::*;
use object_adapter::policy::RequestProcessing;
use object_adapter::{
    AdapterError, AdapterPath, AdapterRuntime, Current, ExceptionKind, ObjectAdapter, ObjectId,
    Response, Servant, ServantActivator, ServantManager, ServantRef,
};

fn managed_child(runtime: &AdapterRuntime, name: &str, activator: Arc<RecordingActivator>) -> Arc<ObjectAdapter> {
    let root = runtime.root();
    let child = root
        .create_child(name, Some(root.manager().clone()), &[RequestProcessing::ServantManager.into()])
        .unwrap();
    child
        .set_servant_manager(ServantManager::Activator(activator))
        .unwrap();
    child
}

#[test]
fn test_concurrent_destroy_single_teardown() {
    init_logging();

    const IDS: u8 = 3;

    for round in 0..10 {
        let runtime = active_runtime();
        let activator = Arc::new(RecordingActivator::new());
        let child = managed_child(&runtime, "contended", activator.clone());
        for n in 0..IDS {
            child.resolve_servant(&ObjectId::new(&[n]), "op").unwrap();
        }

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let destroyers: Vec<_> = [true, false]
            .into_iter()
            .map(|etherealize| {
                let child = child.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    child.destroy(etherealize, false).unwrap();
                })
            })
            .collect();
        for destroyer in destroyers {
            destroyer.join().unwrap();
        }

        // A waiting caller blocks until the teardown finished
        child.destroy(true, true).unwrap();

        let calls = activator.etherealized();
        assert!(
            calls.is_empty() || calls.len() == IDS as usize,
            "round {}: partial teardown {:?}",
            round,
            calls
        );
        assert!(calls.iter().all(|(_, cleanup, _)| *cleanup));
        assert_eq!(runtime.background_workers_spawned(), 1, "round {}", round);
        assert!(runtime.root().child("contended").is_none());
    }
}

#[test]
fn test_concurrent_waiting_and_background_destroy() {
    init_logging();

    const IDS: u8 = 3;

    for round in 0..10 {
        let runtime = active_runtime();
        let activator = Arc::new(RecordingActivator::new());
        let child = managed_child(&runtime, "mixed", activator.clone());
        for n in 0..IDS {
            child.resolve_servant(&ObjectId::new(&[n]), "op").unwrap();
        }

        // (etherealize, wait_for_completion)
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let destroyers: Vec<_> = [(true, false), (false, true)]
            .into_iter()
            .map(|(etherealize, wait)| {
                let child = child.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    child.destroy(etherealize, wait).unwrap();
                })
            })
            .collect();
        for destroyer in destroyers {
            destroyer.join().unwrap();
        }
        child.destroy(false, true).unwrap();

        let calls = activator.etherealized();
        let workers = runtime.background_workers_spawned();
        assert!(workers <= 1, "round {}: {} workers", round, workers);
        if workers == 1 {
            // The background call won and its flag applied
            assert_eq!(calls.len(), IDS as usize, "round {}", round);
        } else {
            // The waiting call won and tore down without etherealizing
            assert!(calls.is_empty(), "round {}: {:?}", round, calls);
        }
        assert!(runtime.root().child("mixed").is_none());
    }
}

#[test]
fn test_first_destroy_flag_wins() {
    init_logging();

    let runtime = active_runtime();
    let activator = Arc::new(RecordingActivator::new());
    let child = managed_child(&runtime, "flagged", activator.clone());
    child.resolve_servant(&ObjectId::new(&[1]), "op").unwrap();
    child.resolve_servant(&ObjectId::new(&[2]), "op").unwrap();

    child.destroy(true, false).unwrap();
    child.destroy(false, false).unwrap();
    child.destroy(false, true).unwrap();

    assert_eq!(activator.etherealized().len(), 2);
    assert_eq!(runtime.background_workers_spawned(), 1);
}

#[test]
fn test_destroy_drains_in_flight_invocations() {
    init_logging();

    const IN_FLIGHT: usize = 3;

    let runtime = Arc::new(active_runtime());
    let root = runtime.root();
    let child = root
        .create_child("draining", Some(root.manager().clone()), &[])
        .unwrap();
    let servant = Arc::new(GatedServant::new());
    let id = child.activate_object(servant.clone()).unwrap();
    let path = child.path().clone();

    let clients: Vec<_> = (0..IN_FLIGHT)
        .map(|_| {
            let runtime = runtime.clone();
            let path = path.clone();
            let id = id.clone();
            thread::spawn(move || {
                runtime
                    .dispatcher()
                    .dispatch(&request(&runtime, &path, &id, "block", Bytes::new()))
            })
        })
        .collect();
    assert!(wait_until(|| servant.inside() == IN_FLIGHT));

    let destroyed = Arc::new(AtomicBool::new(false));
    let destroyer = {
        let child = child.clone();
        let destroyed = destroyed.clone();
        thread::spawn(move || {
            child.destroy(false, true).unwrap();
            destroyed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!destroyed.load(Ordering::SeqCst));
    assert!(child.is_destroyed());

    servant.open();
    destroyer.join().unwrap();
    for client in clients {
        assert!(client.join().unwrap().is_reply());
    }
    assert!(destroyed.load(Ordering::SeqCst));
    assert_eq!(child.invocation_count(), 0);
    assert!(runtime.root().child("draining").is_none());
}

#[test]
fn test_recreated_adapter_serves_requests() {
    init_logging();

    let runtime = active_runtime();
    let servant = Arc::new(EchoServant::new());
    let id = ObjectId::new(&[7]);
    let activator = Arc::new(RecreatingActivator::new(servant.clone(), id.clone()));
    runtime.root().set_activator(Some(activator.clone()));

    let path = AdapterPath::from_segments(["service"]);
    let req = request(&runtime, &path, &id, "echo", Bytes::from_static(b"one"));
    assert!(runtime.dispatcher().dispatch(&req).is_reply());

    let first = runtime.root().child("service").unwrap();
    first.destroy(false, true).unwrap();

    assert!(runtime.dispatcher().dispatch(&req).is_reply());
    let second = runtime.root().child("service").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(activator.calls(), 2);
    assert_eq!(servant.calls(), 2);
}

#[test]
fn test_request_racing_destroy_is_retried() {
    init_logging();

    let runtime = Arc::new(active_runtime());
    let servant = Arc::new(GatedServant::new());
    let id = ObjectId::new(&[9]);
    let activator = Arc::new(RecreatingActivator::new(servant.clone(), id.clone()));
    runtime.root().set_activator(Some(activator.clone()));
    let path = AdapterPath::from_segments(["racy"]);

    // Park one invocation inside the first incarnation of the adapter
    let blocked = {
        let runtime = runtime.clone();
        let path = path.clone();
        let id = id.clone();
        thread::spawn(move || {
            runtime
                .dispatcher()
                .dispatch(&request(&runtime, &path, &id, "block", Bytes::new()))
        })
    };
    assert!(wait_until(|| servant.inside() == 1));

    let first = runtime.root().child("racy").unwrap();
    first.destroy(false, false).unwrap();

    // Finds the adapter mid-destroy, waits, then retries
    let racer = {
        let runtime = runtime.clone();
        let path = path.clone();
        let id = id.clone();
        thread::spawn(move || {
            runtime
                .dispatcher()
                .dispatch(&request(&runtime, &path, &id, "echo", Bytes::from_static(b"late")))
        })
    };

    thread::sleep(Duration::from_millis(50));
    servant.open();

    assert!(blocked.join().unwrap().is_reply());
    let response = racer.join().unwrap();
    assert_eq!(response.body().unwrap().as_ref(), b"late");
    assert_eq!(activator.calls(), 2);
    assert!(first.is_destroyed());
}

#[test]
fn test_etherealize_dispatching_into_destroyed_adapter() {
    /// Dispatches into its own adapter while being torn down
    struct Reentrant {
        runtime: Mutex<Weak<AdapterRuntime>>,
        response: Mutex<Option<Response>>,
    }

    impl ServantActivator for Reentrant {
        fn incarnate(&self, _id: &ObjectId, _adapter: &Arc<ObjectAdapter>) -> object_adapter::Result<Option<ServantRef>> {
            Ok(Some(Arc::new(EchoServant::new())))
        }

        fn etherealize(&self, id: &ObjectId, adapter: &Arc<ObjectAdapter>, _: ServantRef, _: bool, _: bool) {
            let Some(runtime) = self.runtime.lock().upgrade() else {
                return;
            };
            let req = request(&runtime, adapter.path(), id, "echo", Bytes::new());
            *self.response.lock() = Some(runtime.dispatcher().dispatch(&req));
        }
    }

    init_logging();

    let runtime = Arc::new(active_runtime());
    let activator = Arc::new(Reentrant {
        runtime: Mutex::new(Arc::downgrade(&runtime)),
        response: Mutex::new(None),
    });
    let root = runtime.root();
    let child = root
        .create_child("reentrant", Some(root.manager().clone()), &[RequestProcessing::ServantManager.into()])
        .unwrap();
    child
        .set_servant_manager(ServantManager::Activator(activator.clone()))
        .unwrap();
    child.resolve_servant(&ObjectId::new(&[1]), "op").unwrap();

    child.destroy(true, true).unwrap();

    let response = activator.response.lock().take().unwrap();
    assert_eq!(response.exception().unwrap().kind, ExceptionKind::ObjectNotExist);
}

#[test]
fn test_call_into_adapter_destroyed_mid_invocation() {
    /// Destroys its own adapter, then calls a sibling object on it
    struct SelfDestructing {
        runtime: Mutex<Weak<AdapterRuntime>>,
        sibling: Mutex<Option<ObjectId>>,
        nested: Mutex<Option<Response>>,
    }

    impl Servant for SelfDestructing {
        fn repository_ids(&self, _id: &ObjectId) -> Vec<String> {
            vec!["IDL:integration/SelfDestructing:1.0".to_string()]
        }

        fn invoke(&self, _operation: &str, _args: Bytes) -> object_adapter::Result<Bytes> {
            let adapter = Current::adapter()?;
            adapter.destroy(false, false)?;

            let runtime = self
                .runtime
                .lock()
                .upgrade()
                .ok_or_else(|| AdapterError::Internal("runtime gone".to_string()))?;
            let sibling = self
                .sibling
                .lock()
                .clone()
                .ok_or_else(|| AdapterError::Internal("no sibling".to_string()))?;
            let req = request(&runtime, adapter.path(), &sibling, "echo", Bytes::new());
            *self.nested.lock() = Some(runtime.dispatcher().dispatch(&req));
            Ok(Bytes::from_static(b"destroyed"))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    init_logging();

    let runtime = Arc::new(active_runtime());
    let root = runtime.root();
    let child = root
        .create_child("doomed", Some(root.manager().clone()), &[])
        .unwrap();
    let servant = Arc::new(SelfDestructing {
        runtime: Mutex::new(Arc::downgrade(&runtime)),
        sibling: Mutex::new(None),
        nested: Mutex::new(None),
    });
    let id = child.activate_object(servant.clone()).unwrap();
    let sibling = child.activate_object(Arc::new(EchoServant::new())).unwrap();
    *servant.sibling.lock() = Some(sibling);
    let path = child.path().clone();

    let (tx, rx) = mpsc::channel();
    {
        let runtime = runtime.clone();
        thread::spawn(move || {
            let response = runtime
                .dispatcher()
                .dispatch(&request(&runtime, &path, &id, "kill", Bytes::new()));
            let _ = tx.send(response);
        });
    }

    let response = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("nested call after destroy must not block");
    assert_eq!(response.body().unwrap().as_ref(), b"destroyed");

    let nested = servant.nested.lock().take().unwrap();
    assert_eq!(nested.exception().unwrap().kind, ExceptionKind::ObjectNotExist);

    child.destroy(false, true).unwrap();
    assert!(runtime.root().child("doomed").is_none());
    assert_eq!(runtime.background_workers_spawned(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_destroy_inside_tokio() {
    init_logging();

    let runtime = Arc::new(active_runtime());
    let activator = Arc::new(RecordingActivator::new());
    let child = managed_child(&runtime, "async", activator.clone());
    child.resolve_servant(&ObjectId::new(&[1]), "op").unwrap();

    child.destroy(true, false).unwrap();
    let waiter = child.clone();
    tokio::task::spawn_blocking(move || waiter.destroy(false, true))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(activator.etherealized().len(), 1);
    assert_eq!(runtime.background_workers_spawned(), 1);
    assert!(runtime.root().child("async").is_none());
}
