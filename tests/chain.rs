#[cfg(test)]
mod chain {
  use std::cell::RefCell;
  use std::rc::Rc;

  use reactive_kvo::{Computed, Observer, RunLoop, Value};
  use serde_json::json;

  fn values() -> (Rc<RefCell<Vec<Value>>>, Observer) {
    let seen = Rc::new(RefCell::new(vec![]));
    let observer = {
      let seen = seen.clone();
      Observer::from_fn(move |change| seen.borrow_mut().push(change.value.clone()))
    };
    (seen, observer)
  }

  #[test]
  fn chained_path_follows_replaced_intermediates() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let home = run_loop.create_object(json!({ "city": "Jinan" }));
    let office = run_loop.create_object(json!({ "city": "Linyi" }));
    person.set("address", &home).unwrap();

    let (seen, observer) = values();
    person.add_observer("address.city", observer);

    home.set("city", "Qingdao").unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from("Qingdao")]);

    person.set("address", &office).unwrap();
    assert_eq!(seen.borrow().last(), Some(&Value::from("Linyi")));

    // the old intermediate is no longer observed
    let before = seen.borrow().len();
    home.set("city", "Yantai").unwrap();
    assert_eq!(seen.borrow().len(), before);

    office.set("city", "Weifang").unwrap();
    assert_eq!(seen.borrow().last(), Some(&Value::from("Weifang")));
    assert_eq!(person.get_path("address.city"), Value::from("Weifang"));
  }

  #[test]
  fn chain_survives_a_missing_hop() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let (seen, observer) = values();
    person.add_observer("address.city", observer);

    let address = run_loop.create_object(json!({ "city": "Jinan" }));
    person.set("address", &address).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from("Jinan")]);

    person.set("address", Value::NULL).unwrap();
    assert!(seen.borrow().last().map_or(false, Value::is_null));

    address.set("city", "Linyi").unwrap();
    assert_eq!(seen.borrow().len(), 2);
  }

  #[test]
  fn one_batch_notifies_a_chain_once() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let home = run_loop.create_object(json!({ "city": "Jinan" }));
    person.set("address", &home).unwrap();
    let (seen, observer) = values();
    person.add_observer("address.city", observer);

    let office = run_loop.create_object(json!({ "city": "Linyi" }));
    run_loop
      .run(|| {
        home.set("city", "Qingdao").unwrap();
        person.set("address", &office).unwrap();
        office.set("city", "Weifang").unwrap();
      })
      .unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from("Weifang")]);
  }

  #[test]
  fn removing_a_chain_detaches_every_link() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let home = run_loop.create_object(json!({ "city": "Jinan" }));
    person.set("address", &home).unwrap();
    let (seen, observer) = values();
    person.add_observer("address.city", observer.clone());
    assert!(home.has_observers("city"));

    person.remove_observer("address.city", &observer);
    assert!(!home.has_observers("city"));
    assert!(!person.has_observers("address"));
    home.set("city", "Linyi").unwrap();
    assert!(seen.borrow().is_empty());
  }

  #[test]
  fn starred_path_resolves_the_prefix_once() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let home = run_loop.create_object(json!({ "city": "Jinan" }));
    let office = run_loop.create_object(json!({ "city": "Linyi" }));
    person.set("address", &home).unwrap();

    let (seen, observer) = values();
    person.add_observer("address*city", observer);
    assert!(home.has_observers("city"));

    // the object at `address` was fixed when the observer was added
    person.set("address", &office).unwrap();
    office.set("city", "Weifang").unwrap();
    assert!(seen.borrow().is_empty());

    home.set("city", "Qingdao").unwrap();
    assert_eq!(seen.borrow().len(), 1);
  }

  #[test]
  fn dependent_key_on_a_path() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let home = run_loop.create_object(json!({ "city": "Jinan" }));
    person.set("address", &home).unwrap();
    person.define_property(
      "where",
      Computed::getter(|p| Value::from(format!("in {}", p.get_path("address.city").as_str().unwrap_or("?"))))
        .property(["address.city"])
        .cacheable(),
    );
    assert_eq!(person.get("where"), Value::from("in Jinan"));

    let (seen, observer) = values();
    person.add_observer("where", observer);
    home.set("city", "Linyi").unwrap();
    assert_eq!(person.get("where"), Value::from("in Linyi"));
    assert_eq!(*seen.borrow(), vec![Value::from("in Linyi")]);
  }

  #[test]
  fn paths_through_lists() {
    let run_loop = RunLoop::new();
    let person = run_loop.create_object(json!({}));
    let phones = run_loop.create_list(["+44 1234567"]);
    person.set("phones", &phones).unwrap();
    let (seen, observer) = values();
    person.add_observer("phones.length", observer);
    phones.push_object("+44 2345678").unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from(2usize)]);
    assert_eq!(person.get_path("phones.1"), Value::from("+44 2345678"));
  }
}
