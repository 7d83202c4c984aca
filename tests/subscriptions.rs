mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};

use boxquery::{Property, PropertyType, QueryBuilder};

use common::{names, people, person, Person, AGE};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

fn channel_observer() -> (impl Fn(Vec<Person>) + Send + Sync + 'static, Receiver<Vec<Person>>) {
    let (tx, rx) = unbounded();
    let observer = move |rows: Vec<Person>| {
        let _ = tx.send(rows);
    };
    (observer, rx)
}

#[test]
fn observer_receives_initial_snapshot_on_pool_thread() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people))
        .unwrap()
        .filter(AGE.greater(20))
        .unwrap()
        .build()
        .unwrap();

    let (tx, rx) = unbounded();
    let _sub = q
        .subscribe()
        .observer(move |rows: Vec<Person>| {
            let thread = std::thread::current().name().map(str::to_string);
            let _ = tx.send((rows, thread));
        })
        .unwrap();

    let (rows, thread) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(names(&rows), vec!["Alice", "Carol", "Eve"]);
    assert!(thread.unwrap().starts_with("people-pool-"));
    q.close().unwrap();
}

#[test]
fn two_publishes_deliver_two_identical_snapshots() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();
    let (observer, rx) = channel_observer();
    let _sub = q.subscribe().only_changes().observer(observer).unwrap();

    assert!(rx.recv_timeout(QUIET).is_err());
    q.publish();
    q.publish();
    let first = rx.recv_timeout(WAIT).unwrap();
    let second = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
    q.close().unwrap();
}

#[test]
fn every_subscriber_is_notified() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();

    let (tx, rx) = unbounded();
    let subs: Vec<_> = (0..3)
        .map(|index| {
            let tx = tx.clone();
            q.subscribe()
                .only_changes()
                .observer(move |rows: Vec<Person>| {
                    let _ = tx.send((index, rows.len()));
                })
                .unwrap()
        })
        .collect();

    q.publish();
    // Delivery order across subscribers is unspecified.
    let mut seen = HashSet::new();
    for _ in 0..3 {
        let (index, len) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(len, 5);
        seen.insert(index);
    }
    assert_eq!(seen, HashSet::from([0, 1, 2]));
    drop(subs);
    q.close().unwrap();
}

#[test]
fn data_changes_trigger_publish() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people))
        .unwrap()
        .filter(AGE.greater(60))
        .unwrap()
        .build()
        .unwrap();
    let (observer, rx) = channel_observer();
    let sub = q.subscribe().only_changes().observer(observer).unwrap();

    people.put(person("Grace", Some(85), 9.9, true, 1941)).unwrap();
    let rows = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(names(&rows), vec!["Grace"]);

    sub.cancel();
    assert!(sub.is_canceled());
    people.put(person("Heidi", Some(70), 1.0, true, 1956)).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
    q.close().unwrap();
}

#[test]
fn single_delivers_once() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();
    let (observer, rx) = channel_observer();
    let _sub = q.subscribe().single().observer(observer).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().len(), 5);
    q.publish();
    people.put(person("Ivan", Some(50), 3.0, false, 1976)).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
    q.close().unwrap();
}

#[test]
fn publish_failures_reach_error_handler() {
    let people = people();
    // Property 1 holds text; reading it as an integer fails during matching.
    let misread = Property::new(1, "name_as_long", PropertyType::Long);
    let q = QueryBuilder::new(Arc::clone(&people))
        .unwrap()
        .filter(misread.greater(1))
        .unwrap()
        .build()
        .unwrap();

    let (tx, rx) = unbounded();
    let _sub = q
        .subscribe()
        .on_error(move |e| {
            let _ = tx.send(e.is_engine());
        })
        .observer(|_: Vec<Person>| panic!("no data expected"))
        .unwrap();

    assert!(rx.recv_timeout(WAIT).unwrap());
    q.close().unwrap();
}

#[test]
fn close_detaches_subscribers() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();
    let (observer, rx) = channel_observer();
    let sub = q.subscribe().only_changes().observer(observer).unwrap();

    q.close().unwrap();
    assert!(sub.is_canceled());
    people.put(person("Judy", Some(22), 2.0, true, 2003)).unwrap();
    q.publish();
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn closed_query_rejects_new_observers() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();
    q.close().unwrap();

    let (observer, rx) = channel_observer();
    let err = q.subscribe().only_changes().observer(observer).unwrap_err();
    assert!(err.is_closed());
    let err = q.subscribe().single().observer(|_: Vec<Person>| {}).unwrap_err();
    assert!(err.is_closed());
    assert_eq!(people.listener_count(), 0);

    people.put(person("Kim", Some(40), 1.0, true, 1986)).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn close_during_publish_does_not_report_errors() {
    let people = people();
    let q = QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap();
    let (tx, rx) = unbounded();
    let _sub = q
        .subscribe()
        .only_changes()
        .on_error(move |e| {
            let _ = tx.send(e.to_string());
        })
        .observer(|_: Vec<Person>| {})
        .unwrap();

    for _ in 0..20 {
        q.publish();
    }
    q.close().unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn listener_survives_concurrent_subscribe_and_cancel() {
    let people = people();
    let q = Arc::new(QueryBuilder::new(Arc::clone(&people)).unwrap().build().unwrap());

    for _ in 0..500 {
        let first = q.subscribe().only_changes().observer(|_: Vec<Person>| {}).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let canceler = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                drop(first);
            })
        };
        let subscriber = {
            let barrier = Arc::clone(&barrier);
            let q = Arc::clone(&q);
            thread::spawn(move || {
                barrier.wait();
                q.subscribe().only_changes().observer(|_: Vec<Person>| {}).unwrap()
            })
        };
        canceler.join().unwrap();
        let second = subscriber.join().unwrap();

        assert_eq!(people.listener_count(), 1);
        drop(second);
        assert_eq!(people.listener_count(), 0);
    }

    let (observer, rx) = channel_observer();
    let _sub = q.subscribe().only_changes().observer(observer).unwrap();
    people.put(person("Liam", Some(33), 2.5, true, 1993)).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().len(), 6);
    q.close().unwrap();
}
