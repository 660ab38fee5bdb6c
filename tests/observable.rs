#[cfg(test)]
mod observable {
  use std::cell::{Cell, RefCell};
  use std::rc::Rc;

  use reactive_kvo::{Change, Computed, Error, Object, Observer, RunLoop, TargetId, Value};
  use serde_json::json;

  fn recorder() -> (Rc<RefCell<Vec<Change>>>, Observer) {
    let seen = Rc::new(RefCell::new(vec![]));
    let observer = {
      let seen = seen.clone();
      Observer::from_fn(move |change| seen.borrow_mut().push(change.clone()))
    };
    (seen, observer)
  }

  fn tenfold(run_loop: &RunLoop) -> Object {
    let obj = run_loop.create_object(json!({ "a": 1 }));
    obj.define_property(
      "b",
      Computed::getter(|o| Value::from(o.get("a").as_i64().unwrap_or(0) * 10))
        .property(["a"])
        .cacheable(),
    );
    obj
  }

  #[test]
  fn get_and_set_plain_properties() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "name": "John Doe", "age": 43 }));
    assert_eq!(obj.get("name"), Value::from("John Doe"));
    assert!(obj.get("missing").is_null());
    obj.set("age", 18).unwrap();
    assert_eq!(obj.get("age"), Value::from(18));
    assert_eq!(obj.keys(), vec!["age".to_string(), "name".to_string()]);
  }

  #[test]
  fn batched_changes_notify_dependents_once_with_the_final_value() {
    let run_loop = RunLoop::new();
    let obj = tenfold(&run_loop);
    let (seen, observer) = recorder();
    obj.add_observer("b", observer);

    run_loop.begin();
    obj.set("a", 2).unwrap();
    obj.set("a", 3).unwrap();
    assert!(seen.borrow().is_empty());
    run_loop.end().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].key, "b");
    assert_eq!(seen[0].value, Value::from(30));
  }

  #[test]
  fn cacheable_computed_is_invalidated_by_its_dependency() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let calls = Rc::new(Cell::new(0));
    {
      let calls = calls.clone();
      obj.define_property(
        "double",
        Computed::getter(move |o| {
          calls.set(calls.get() + 1);
          Value::from(o.get("a").as_i64().unwrap_or(0) * 2)
        })
        .property(["a"])
        .cacheable(),
      );
    }
    assert_eq!(obj.get("double"), Value::from(2));
    assert_eq!(obj.get("double"), Value::from(2));
    assert_eq!(calls.get(), 1);
    obj.set("a", 5).unwrap();
    assert_eq!(obj.get("double"), Value::from(10));
    assert_eq!(calls.get(), 2);
  }

  #[test]
  fn dependent_keys_are_transitive() {
    let run_loop = RunLoop::new();
    let obj = tenfold(&run_loop);
    obj.define_property(
      "label",
      Computed::getter(|o| Value::from(format!("b={}", o.get("b")))).property(["b"]),
    );
    let (seen, observer) = recorder();
    obj.add_observer("label", observer);
    obj.set("a", 4).unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].value, Value::from("b=40"));
  }

  #[test]
  fn computed_setter_stores_through_the_accessor() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "first": "John", "last": "Doe" }));
    obj.define_property(
      "full",
      Computed::new(|o, _, value| {
        if let Some(value) = value {
          let value = value.as_str().unwrap_or_default().to_string();
          let mut parts = value.splitn(2, ' ');
          o.set("first", parts.next().unwrap_or_default()).unwrap();
          o.set("last", parts.next().unwrap_or_default()).unwrap();
        }
        Value::from(format!("{} {}", o.get("first").as_str().unwrap_or_default(), o.get("last").as_str().unwrap_or_default()))
      })
      .property(["first", "last"]),
    );
    obj.set("full", "Jane Roe").unwrap();
    assert_eq!(obj.get("first"), Value::from("Jane"));
    assert_eq!(obj.get("full"), Value::from("Jane Roe"));
  }

  #[test]
  fn setting_an_equal_value_does_not_notify() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let (seen, observer) = recorder();
    obj.add_observer("a", observer);
    obj.set("a", 1).unwrap();
    assert!(seen.borrow().is_empty());
    obj.notify_property_change("a").unwrap();
    assert_eq!(seen.borrow().len(), 1);
  }

  #[test]
  fn an_observer_registered_twice_fires_once() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let count = Rc::new(Cell::new(0));
    let target = TargetId::unique();
    for _ in 0..2 {
      let count = count.clone();
      obj.add_observer("a", Observer::new(target, "a_did_change", move |_| count.set(count.get() + 1)));
    }
    assert_eq!(obj.observer_count("a"), 1);
    obj.set("a", 2).unwrap();
    assert_eq!(count.get(), 1);

    obj.remove_observer("a", &Observer::new(target, "a_did_change", |_| {}));
    assert!(!obj.has_observers("a"));
    obj.set("a", 3).unwrap();
    assert_eq!(count.get(), 1);
  }

  #[test]
  fn previous_value_is_the_one_before_the_batch() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let (seen, observer) = recorder();
    obj.add_observer("a", observer.with_context("ctx"));
    run_loop
      .run(|| {
        obj.set("a", 2).unwrap();
        obj.set("a", 3).unwrap();
      })
      .unwrap();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].previous, Some(Value::from(1)));
    assert_eq!(seen[0].value, Value::from(3));
    assert_eq!(seen[0].context, Some(Value::from("ctx")));
    assert_eq!(seen[0].sender, obj);
  }

  #[test]
  fn star_observers_hear_every_key() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1, "b": 2 }));
    let (seen, observer) = recorder();
    obj.add_observer("*", observer);
    run_loop
      .run(|| {
        obj.set("a", 10).unwrap();
        obj.set("b", 20).unwrap();
      })
      .unwrap();
    let keys: Vec<String> = seen.borrow().iter().map(|c| c.key.clone()).collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn one_shot_observers_are_removed_after_firing() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let (seen, observer) = recorder();
    obj.add_observer("a", observer.once());
    obj.set("a", 2).unwrap();
    obj.set("a", 3).unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert!(!obj.has_observers("a"));
  }

  #[test]
  fn property_change_groups_defer_until_closed() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let (seen, observer) = recorder();
    obj.add_observer("a", observer);
    obj.begin_property_changes();
    obj.set("a", 2).unwrap();
    run_loop.tick().unwrap();
    assert!(seen.borrow().is_empty());
    assert!(obj.is_changing());
    obj.end_property_changes().unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(obj.end_property_changes(), Err(Error::UnbalancedPropertyChanges(obj.id())));
  }

  #[test]
  fn frozen_objects_reject_sets() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    obj.freeze();
    assert!(obj.is_frozen());
    assert_eq!(obj.set("a", 2), Err(Error::Frozen { key: "a".into() }));
    assert_eq!(obj.get("a"), Value::from(1));
  }

  #[test]
  fn increment_decrement_toggle() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "count": 1, "open": false }));
    assert_eq!(obj.increment_property("count", 2).unwrap(), Value::from(3));
    assert_eq!(obj.decrement_property("count", 1).unwrap(), Value::from(2));
    assert_eq!(obj.increment_property("fresh", 1).unwrap(), Value::from(1));
    assert_eq!(obj.toggle_property("open").unwrap(), Value::from(true));
    assert_eq!(obj.get("open"), Value::from(true));
  }

  #[test]
  fn increments_keep_floats_and_saturate_integers() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "ratio": 2.5, "big": i64::MAX, "small": i64::MIN }));
    assert_eq!(obj.increment_property("ratio", 1).unwrap(), Value::from(3.5));
    assert_eq!(obj.decrement_property("ratio", 2).unwrap(), Value::from(1.5));
    assert_eq!(obj.increment_property("big", 1).unwrap(), Value::from(i64::MAX));
    assert_eq!(obj.decrement_property("small", 1).unwrap(), Value::from(i64::MIN));
    assert_eq!(obj.decrement_property("small", i64::MIN).unwrap(), Value::from(-1));
  }

  #[test]
  fn methods_and_unknown_properties() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "n": 2 }));
    obj.define_method("times", |o, args| {
      let by = args.first().and_then(Value::as_i64).unwrap_or(1);
      Value::from(o.get("n").as_i64().unwrap_or(0) * by)
    });
    assert_eq!(obj.invoke("times", &[Value::from(21)]), Value::from(42));
    assert!(obj.invoke("nope", &[]).is_null());
    obj.set_unknown_property(|_, key| Value::from(format!("<{}>", key)));
    assert_eq!(obj.get("anything"), Value::from("<anything>"));
  }

  #[test]
  fn destroyed_objects_stop_notifying_and_leave_the_registry() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(json!({ "a": 1 }));
    let id = obj.id();
    let (seen, observer) = recorder();
    obj.add_observer("a", observer.clone());
    assert_eq!(run_loop.object(id), Some(obj.clone()));
    obj.destroy();
    assert!(obj.is_destroyed());
    assert!(run_loop.object(id).is_none());
    obj.set("a", 2).unwrap();
    obj.add_observer("a", observer);
    assert!(seen.borrow().is_empty());
    assert!(!obj.has_observers("a"));
  }

  #[test]
  fn dropped_objects_leave_the_registry() {
    let run_loop = RunLoop::new();
    let id = run_loop.create_object(json!({})).id();
    assert!(run_loop.object(id).is_none());
  }
}
