#[cfg(test)]
mod array {
  use std::cell::RefCell;
  use std::rc::Rc;

  use reactive_kvo::{
    ArrayChange, ArrayObserver, Enumerable, Error, IndexSet, List, Observer, RangeChange, RunLoop, TargetId, Value,
  };
  use serde_json::json;

  type Log = Rc<RefCell<Vec<(&'static str, ArrayChange)>>>;

  fn watch(list: &List) -> Log {
    let log: Log = Rc::new(RefCell::new(vec![]));
    let will = log.clone();
    let did = log.clone();
    list.add_array_observer(
      ArrayObserver::new(TargetId::unique())
        .will_change(move |_, change| will.borrow_mut().push(("will", change)))
        .did_change(move |_, change| did.borrow_mut().push(("did", change))),
    );
    log
  }

  fn keys(list: &List) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(vec![]));
    let observer = {
      let seen = seen.clone();
      Observer::from_fn(move |change| seen.borrow_mut().push(change.key.clone()))
    };
    list.entity().add_observer("*", observer);
    seen
  }

  fn change(start: usize, removed: usize, added: usize) -> ArrayChange {
    ArrayChange { start, removed, added }
  }

  #[test]
  fn replace_fires_one_bracket() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2, 3, 4, 5]);
    let log = watch(&list);
    list.replace(2, 1, ["a", "b"]).unwrap();
    assert_eq!(*log.borrow(), vec![("will", change(2, 1, 2)), ("did", change(2, 1, 2))]);
    assert_eq!(list.len(), 6);
    assert_eq!(list.object_at(3), Some(Value::from("b")));
  }

  #[test]
  fn push_on_four_items() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2, 3, 4]);
    let log = watch(&list);
    list.push_object(5).unwrap();
    assert_eq!(log.borrow().last(), Some(&("did", change(4, 0, 1))));
    assert_eq!(log.borrow().len(), 2);
  }

  #[test]
  fn mutators_map_onto_replace() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list(["b", "c"]);
    let log = watch(&list);
    list.unshift_object("a").unwrap();
    list.insert_at(3, "d").unwrap();
    assert_eq!(list.pop_object().unwrap(), Some(Value::from("d")));
    assert_eq!(list.shift_object().unwrap(), Some(Value::from("a")));
    list.remove_at(0, 1).unwrap();
    list.push_objects(["x", "y"]).unwrap();
    assert_eq!(list.to_vec(), vec![Value::from("c"), Value::from("x"), Value::from("y")]);

    let dids: Vec<ArrayChange> = log.borrow().iter().filter(|(kind, _)| *kind == "did").map(|(_, c)| *c).collect();
    assert_eq!(
      dids,
      vec![change(0, 0, 1), change(3, 0, 1), change(3, 1, 0), change(0, 1, 0), change(0, 1, 0), change(1, 0, 2)]
    );
  }

  #[test]
  fn out_of_range_is_an_error() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2]);
    assert_eq!(list.replace(3, 0, [9]), Err(Error::IndexOutOfRange { index: 3, length: 2 }));
    assert_eq!(list.insert_at(5, 9), Err(Error::IndexOutOfRange { index: 5, length: 2 }));
    assert_eq!(list.remove_at(2, 1), Err(Error::IndexOutOfRange { index: 2, length: 2 }));
    // the amount is clamped to the end
    list.replace(1, 10, Vec::<Value>::new()).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(run_loop.depth(), 0);
  }

  #[test]
  fn remove_object_removes_every_occurrence() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2, 1, 3, 1]);
    let seen = keys(&list);
    assert_eq!(list.remove_object(&Value::from(1)).unwrap(), 3);
    assert_eq!(list.to_vec(), vec![Value::from(2), Value::from(3)]);
    // one batch, so `length` is reported once
    assert_eq!(seen.borrow().iter().filter(|k| *k == "length").count(), 1);
    assert_eq!(list.remove_object(&Value::from(7)).unwrap(), 0);
  }

  #[test]
  fn key_notifications_follow_the_change() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list(["a", "b", "c"]);
    let seen = keys(&list);

    list.replace(1, 1, ["B"]).unwrap();
    assert_eq!(*seen.borrow(), vec!["[]".to_string()]);

    seen.borrow_mut().clear();
    list.push_object("d").unwrap();
    assert_eq!(*seen.borrow(), vec!["[]".to_string(), "length".to_string(), "lastObject".to_string()]);

    seen.borrow_mut().clear();
    list.shift_object().unwrap();
    let got = seen.borrow().clone();
    assert!(got.contains(&"firstObject".to_string()));
    assert!(got.contains(&"length".to_string()));

    assert_eq!(list.get("firstObject"), Value::from("B"));
    assert_eq!(list.get("lastObject"), Value::from("d"));
    assert_eq!(list.get("length"), Value::from(3usize));
    assert_eq!(list.get("1"), Value::from("c"));
  }

  #[test]
  fn length_observers_are_coalesced_in_a_run() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list(Vec::<Value>::new());
    let lengths = Rc::new(RefCell::new(vec![]));
    {
      let lengths = lengths.clone();
      list.entity().add_observer("length", Observer::from_fn(move |c| lengths.borrow_mut().push(c.value.clone())));
    }
    run_loop
      .run(|| {
        for i in 0..5 {
          list.push_object(i).unwrap();
        }
      })
      .unwrap();
    assert_eq!(*lengths.borrow(), vec![Value::from(5usize)]);
  }

  #[test]
  fn did_change_all_reports_the_length_seen_at_will_change() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2, 3]);
    let log = watch(&list);
    list.mutate_in_place(|items| items.truncate(1)).unwrap();
    assert_eq!(*log.borrow(), vec![("will", change(0, 3, 0)), ("did", change(0, 3, 1))]);

    log.borrow_mut().clear();
    list.array_content_did_change_all().unwrap();
    assert_eq!(*log.borrow(), vec![("did", change(0, 1, 1))]);
  }

  #[test]
  fn huge_reported_ranges_do_not_overflow() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1, 2]);
    let log = watch(&list);
    list.array_content_did_change(usize::MAX, usize::MAX, usize::MAX).unwrap();
    assert_eq!(*log.borrow(), vec![("did", change(usize::MAX, usize::MAX, usize::MAX))]);
    assert_eq!(list.len(), 2);
    assert_eq!(run_loop.depth(), 0);
  }

  #[test]
  fn removed_array_observers_stay_quiet() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list([1]);
    let target = TargetId::unique();
    let log: Log = Rc::new(RefCell::new(vec![]));
    let observer = {
      let log = log.clone();
      ArrayObserver::new(target).did_change(move |_, c| log.borrow_mut().push(("did", c)))
    };
    list.add_array_observer(observer.clone());
    list.add_array_observer(observer.clone());
    assert_eq!(list.array_observer_count(), 1);
    list.push_object(2).unwrap();
    list.remove_array_observer(&observer);
    list.push_object(3).unwrap();
    assert_eq!(log.borrow().len(), 1);
  }

  #[test]
  fn range_observers_hear_only_their_range_once_per_cycle() {
    let run_loop = RunLoop::new();
    let list = run_loop.create_list((0..20).collect::<Vec<i32>>());
    let heard: Rc<RefCell<Vec<IndexSet>>> = Rc::new(RefCell::new(vec![]));
    let observer = {
      let heard = heard.clone();
      list.add_range_observer(IndexSet::with_range(10, 5), move |change: &RangeChange| {
        heard.borrow_mut().push(change.indexes.clone())
      })
    };

    list.replace(0, 1, [100]).unwrap();
    assert!(heard.borrow().is_empty());

    run_loop
      .run(|| {
        list.replace(11, 1, [111]).unwrap();
        list.replace(13, 1, [113]).unwrap();
      })
      .unwrap();
    assert_eq!(heard.borrow().len(), 1);
    assert_eq!(heard.borrow()[0].ranges(), &[11..12, 13..14]);

    // inserting before the range shifts everything after it
    heard.borrow_mut().clear();
    list.insert_at(2, -1).unwrap();
    assert_eq!(heard.borrow()[0].ranges(), &[10..15]);

    observer.update(IndexSet::from_index(0));
    heard.borrow_mut().clear();
    list.replace(12, 1, [0]).unwrap();
    assert!(heard.borrow().is_empty());

    observer.destroy();
    assert_eq!(list.range_observer_count(), 0);
    list.replace(0, 1, [0]).unwrap();
    assert!(heard.borrow().is_empty());
  }

  #[test]
  fn range_observers_can_watch_members() {
    let run_loop = RunLoop::new();
    let ann = run_loop.create_object(json!({ "name": "Ann" }));
    let bob = run_loop.create_object(json!({ "name": "Bob" }));
    let list = run_loop.create_list([&ann, &bob]);
    let heard: Rc<RefCell<Vec<(Vec<usize>, Option<String>)>>> = Rc::new(RefCell::new(vec![]));
    let _observer = {
      let heard = heard.clone();
      list
        .add_range_observer(IndexSet::from_index(1), move |change: &RangeChange| {
          let key = change.member.as_ref().map(|(_, key)| key.clone());
          heard.borrow_mut().push((change.indexes.iter().collect(), key))
        })
        .observing_members()
    };

    ann.set("name", "Anne").unwrap();
    assert!(heard.borrow().is_empty());
    bob.set("name", "Robert").unwrap();
    assert_eq!(*heard.borrow(), vec![(vec![1], Some("name".to_string()))]);
  }

  #[test]
  fn enumerable_over_lists() {
    let run_loop = RunLoop::new();
    let ann = run_loop.create_object(json!({ "name": "Ann", "admin": true }));
    let bob = run_loop.create_object(json!({ "name": "Bob", "admin": false }));
    bob.define_method("greet", |o, _| Value::from(format!("hi {}", o.get("name").as_str().unwrap_or_default())));
    let list = run_loop.create_list([&ann, &bob]);

    assert_eq!(list.map_property("name"), vec![Value::from("Ann"), Value::from("Bob")]);
    assert_eq!(list.filter_property("admin", None), vec![Value::from(&ann)]);
    assert_eq!(list.index_of(&Value::from(&bob)), Some(1));
    assert_eq!(list.invoke("greet", &[]), vec![Value::NULL, Value::from("hi Bob")]);
    assert_eq!(list.objects().count(), 2);
    assert_eq!(list.group_by("admin").len(), 2);
  }
}
