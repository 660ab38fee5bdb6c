use reactive_kvo::{ArrayObserver, Binding, Computed, Config, Observer, RunLoop, TargetId};

fn main() -> reactive_kvo::Result<()> {
  env_logger::init();

  let run_loop = RunLoop::with_config(Config::from_env());
  let person = run_loop.create_object(serde_json::json!({
      "name": "John Doe",
      "age": 43,
      "address": {
          "province": "山东"
      }
  }));
  let phones = run_loop.create_list(["+44 1234567", "+44 2345678"]);
  person.set("phones", &phones)?;
  person.define_property(
    "summary",
    Computed::getter(|p| format!("{} ({})", p.get("name"), p.get("age")).into())
      .property(["name", "age"])
      .cacheable(),
  );

  person.add_observer("summary", Observer::from_fn(|change| {
    println!("-- summary: {}", change.value);
  }));
  person.add_observer("phones.[]", Observer::from_fn(|change| {
    println!("-- hello observer, phones.1: {}", change.sender.get_path("phones.1"));
  }));
  phones.add_array_observer(ArrayObserver::new(TargetId::unique()).did_change(|list, change| {
    println!("-- phones changed at {} (-{} +{}), now {}", change.start, change.removed, change.added, list.len());
  }));

  let label = run_loop.create_object(serde_json::json!({ "text": null }));
  let _binding = Binding::from(&person, "name").to(&label, "text").connect(&run_loop)?;

  run_loop.run(|| -> reactive_kvo::Result<()> {
    person.set("name", "zhangsan")?;
    person.set("age", 18)?;
    person.set("age", 19)?;
    phones.replace(1, 1, ["0539"])?;
    Ok(())
  })??;

  println!(
    "name: {}, age: {}, label: {}",
    person.get("name"),
    person.get("age"),
    label.get("text")
  );
  println!("first phone {}", person.get_path("phones.0"));
  println!("province {}", person.get_path("address.province"));
  Ok(())
}
