use lineage::{
    Error, EvalError, EvalSettings, EvalState, ExperimentalFeature, Origin, Value, ValueId,
};
use proptest::prelude::*;
use serde_json::json;

fn tracking_state() -> EvalState {
    EvalState::new(EvalSettings::default().with_feature(ExperimentalFeature::ProvenanceTracking))
}

fn eval_with(state: &mut EvalState, code: &str) -> serde_json::Value {
    let value = state.eval_string(code, Origin::String).unwrap();
    state.to_json(value).unwrap()
}

fn eval(code: &str) -> serde_json::Value {
    eval_with(&mut tracking_state(), code)
}

fn eval_error(code: &str) -> EvalError {
    let mut state = tracking_state();
    match state.eval_string(code, Origin::String) {
        Err(Error::Eval(error)) => error,
        Err(Error::Parse(diagnostics)) => panic!("parse failed: {diagnostics:?}"),
        Ok(value) => match state.to_json(value) {
            Err(error) => error,
            Ok(json) => panic!("expected an error, got {json}"),
        },
    }
}

#[test]
fn track_then_get_renders_a_leaf() {
    let rendered = eval(r#"builtins.getProvenance (builtins.trackProvenance "k" 42)"#);
    assert_eq!(
        rendered,
        json!({
            "identifier": "k",
            "kind": "definition",
            "value": 42,
            "provenance": { "file": "«string»", "line": 1, "column": 25 },
            "dependencies": [],
        })
    );
}

#[test]
fn untracked_values_have_no_lineage() {
    assert_eq!(eval("builtins.getProvenance 42"), json!(null));
    assert_eq!(eval("builtins.getProvenance { a = 1; }"), json!(null));
    assert_eq!(eval("builtins.getProvenance (1 + 2)"), json!(null));
}

#[test]
fn track_returns_the_value_unchanged() {
    assert_eq!(eval(r#"builtins.trackProvenance "k" 42"#), json!(42));
    assert_eq!(
        eval(r#"builtins.trackProvenance "k" { b = [ 1 2 ]; a = "x"; }"#),
        json!({ "a": "x", "b": [1, 2] })
    );
}

#[test]
fn identifier_can_be_any_value() {
    let rendered = eval(
        r#"builtins.getProvenance (builtins.trackProvenance { source = "db"; row = 7; } true)"#,
    );
    assert_eq!(rendered["identifier"], json!({ "source": "db", "row": 7 }));
    assert_eq!(rendered["value"], json!(true));
}

#[test]
fn tracking_twice_chains_the_nodes() {
    let rendered = eval(
        r#"
        let
          inner = builtins.trackProvenance "inner" 1;
          outer = builtins.trackProvenance "outer" inner;
        in builtins.getProvenance outer
        "#,
    );
    assert_eq!(rendered["identifier"], json!("outer"));
    assert_eq!(rendered["value"], json!(1));
    let deps = rendered["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0]["identifier"], json!("inner"));
    assert_eq!(deps[0]["kind"], json!("definition"));
    assert_eq!(deps[0]["value"], json!(null));
    assert_eq!(deps[0]["dependencies"], json!([]));
    assert_eq!(deps[0]["provenance"]["line"], json!(3));
}

#[test]
fn record_attributes_are_tracked_independently() {
    let rendered = eval(
        r#"
        let
          config = builtins.trackProvenance "config" {
            port = 8080;
            host = "localhost";
          };
        in {
          port = builtins.getProvenance config.port;
          host = builtins.getProvenance config.host;
          whole = builtins.getProvenance config;
        }
        "#,
    );
    assert_eq!(rendered["port"]["identifier"], json!("config"));
    assert_eq!(rendered["port"]["value"], json!(8080));
    assert_eq!(rendered["port"]["provenance"]["line"], json!(4));
    assert_eq!(rendered["port"]["provenance"]["column"], json!(13));
    assert_eq!(rendered["host"]["identifier"], json!("config"));
    assert_eq!(rendered["host"]["value"], json!("localhost"));
    assert_eq!(rendered["host"]["provenance"]["line"], json!(5));
    assert_eq!(rendered["whole"], json!(null));
}

#[test]
fn tracked_record_keeps_a_lineage_sidecar() {
    let mut state = tracking_state();
    let value = state
        .eval_string(r#"builtins.trackProvenance "r" { b = 2; a = 1; }"#, Origin::String)
        .unwrap();
    let Value::Attrs(bindings) = state.value(value).clone() else {
        panic!("expected a record");
    };
    let (a, b) = (state.symbols.create("a"), state.symbols.create("b"));

    let arena = state.mem.bindings();
    assert!(arena.has_any_tracked_bindings());
    let view = arena.get(bindings);
    assert!(view.has_lineage());
    for name in [a, b] {
        let lineage = view.lineage(name).unwrap();
        assert_eq!(
            state.provenance_interner[lineage.node].kind,
            "definition"
        );
        assert_eq!(
            state.get_provenance(view.get(name).unwrap().value),
            Some(lineage.node)
        );
    }
    assert_eq!(view.tracking_path().len(), 2);
}

#[test]
fn list_elements_are_tracked_independently() {
    let rendered = eval(
        r#"let xs = builtins.trackProvenance "xs" [
  1
  (2 + 3)
];
in {
  first = builtins.getProvenance (builtins.elemAt xs 0);
  second = builtins.getProvenance (builtins.elemAt xs 1);
  whole = builtins.getProvenance xs;
}"#,
    );
    // A literal has no position of its own: the call site is used
    assert_eq!(
        rendered["first"]["provenance"],
        json!({ "file": "«string»", "line": 1, "column": 10 })
    );
    assert_eq!(rendered["first"]["value"], json!(1));
    assert_eq!(
        rendered["second"]["provenance"],
        json!({ "file": "«string»", "line": 3, "column": 4 })
    );
    assert_eq!(rendered["second"]["value"], json!(5));
    assert_eq!(rendered["second"]["identifier"], json!("xs"));
    assert_eq!(rendered["whole"], json!(null));
}

#[test]
fn file_name_follows_the_origin() {
    let mut state = tracking_state();
    let value = state
        .eval_string(
            r#"builtins.getProvenance (builtins.trackProvenance "k" 1)"#,
            Origin::Path("/srv/config/default.nix".into()),
        )
        .unwrap();
    let rendered = state.to_json(value).unwrap();
    assert_eq!(
        rendered["provenance"]["file"],
        json!("/srv/config/default.nix")
    );

    let value = state
        .eval_string(
            r#"builtins.getProvenance (builtins.trackProvenance "k" 1)"#,
            Origin::Stdin,
        )
        .unwrap();
    assert_eq!(state.to_json(value).unwrap()["provenance"]["file"], json!("«stdin»"));
}

#[test]
fn remove_strips_lineage() {
    assert_eq!(
        eval(
            r#"builtins.getProvenance (builtins.removeProvenance (builtins.trackProvenance "k" 1))"#
        ),
        json!(null)
    );
    assert_eq!(
        eval(r#"builtins.removeProvenance (builtins.trackProvenance "k" 1)"#),
        json!(1)
    );
    assert_eq!(eval("builtins.removeProvenance [ 1 2 ]"), json!([1, 2]));
}

#[test]
fn remove_leaves_the_original_tracked() {
    let rendered = eval(
        r#"
        let
          tracked = builtins.trackProvenance "k" 1;
          stripped = builtins.removeProvenance tracked;
        in [ (builtins.getProvenance stripped) (builtins.getProvenance tracked).identifier ]
        "#,
    );
    assert_eq!(rendered, json!([null, "k"]));
}

#[test]
fn remove_is_shallow() {
    let rendered = eval(
        r#"
        let
          record = builtins.removeProvenance (builtins.trackProvenance "r" { a = 1; });
          list = builtins.removeProvenance (builtins.trackProvenance "l" [ 1 ]);
        in {
          attribute = (builtins.getProvenance record.a).identifier;
          element = (builtins.getProvenance (builtins.elemAt list 0)).identifier;
        }
        "#,
    );
    assert_eq!(rendered, json!({ "attribute": "r", "element": "l" }));
}

#[test]
fn tracking_forces_compound_children() {
    let error = eval_error(r#"builtins.trackProvenance "k" { ok = 1; broken = 1 / 0; }"#);
    assert!(matches!(error, EvalError::DivisionByZero { .. }), "{error:?}");

    let error = eval_error(r#"builtins.trackProvenance "k" [ 1 missing ]"#);
    assert!(matches!(error, EvalError::UndefinedVariable { ref name, .. } if name == "missing"));

    let mut state = tracking_state();
    let value = state
        .eval_string(
            r#"builtins.trackProvenance "k" { a = 1 + 1; b = [ (2 * 2) ]; }"#,
            Origin::String,
        )
        .unwrap();
    let Value::Attrs(bindings) = state.value(value).clone() else {
        panic!("expected a record");
    };
    let children: Vec<ValueId> = state
        .mem
        .bindings()
        .get(bindings)
        .iter()
        .map(|attr| attr.value)
        .collect();
    for child in children {
        assert!(!matches!(state.value(child), Value::Thunk(_)));
    }
}

#[test]
fn builtins_are_gated_behind_the_feature() {
    let mut state = EvalState::default();
    for name in ["trackProvenance", "getProvenance", "removeProvenance"] {
        let code = format!("builtins.{name}");
        match state.eval_string(&code, Origin::String) {
            Err(Error::Eval(EvalError::MissingAttribute { name: missing, .. })) => {
                assert_eq!(missing, name)
            }
            other => panic!("expected a missing attribute, got {other:?}"),
        }
    }
    let value = state.eval_string("builtins.typeOf 1", Origin::String).unwrap();
    assert_eq!(state.to_json(value).unwrap(), json!("int"));
}

#[test]
fn arithmetic_derives_lineage_from_tracked_operands() {
    let rendered = eval(
        r#"
        let
          a = builtins.trackProvenance "a" 2;
          b = builtins.trackProvenance "b" 3;
        in builtins.getProvenance (a + b)
        "#,
    );
    assert_eq!(rendered["identifier"], json!(null));
    assert_eq!(rendered["kind"], json!("binary_add"));
    assert_eq!(rendered["value"], json!(5));
    assert_eq!(rendered["provenance"]["line"], json!(5));
    let deps = rendered["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0]["identifier"], json!("a"));
    assert_eq!(deps[1]["identifier"], json!("b"));
    assert!(deps.iter().all(|dep| dep["value"].is_null()));
}

#[test]
fn each_operation_names_its_kind() {
    let cases = [
        ("a - 1", "binary_sub"),
        ("2 * a", "binary_mul"),
        ("a / 2", "binary_div"),
        ("-a", "binary_sub"),
        ("s + \"!\"", "string_concat"),
        ("\"<${s}>\"", "string_interpolation"),
        ("nested.list ++ [ 4 ]", "list_concat"),
        ("nested.record // { b = 2; }", "attr_merge"),
    ];
    for (operation, expected) in cases {
        let code = format!(
            r#"
            let
              a = builtins.trackProvenance "a" 6;
              s = builtins.trackProvenance "s" "text";
              nested = builtins.trackProvenance "n" {{ list = [ 3 ]; record = {{ a = 1; }}; }};
            in builtins.getProvenance ({operation})
            "#
        );
        let rendered = eval(&code);
        assert_eq!(rendered["kind"], json!(expected), "{operation}");
        let deps = rendered["dependencies"].as_array().unwrap();
        assert_eq!(deps.len(), 1, "{operation}");
        assert_eq!(deps[0]["kind"], json!("definition"), "{operation}");
    }
}

#[test]
fn merge_keeps_per_attribute_lineage_of_the_winning_side() {
    let rendered = eval(
        r#"
        let
          tracked = builtins.trackProvenance "r" { a = 1; b = 2; };
          merged = tracked // { b = 3; };
        in {
          a = (builtins.getProvenance merged.a).identifier;
          b = builtins.getProvenance merged.b;
        }
        "#,
    );
    assert_eq!(rendered, json!({ "a": "r", "b": null }));

    let mut state = tracking_state();
    let value = state
        .eval_string(
            r#"(builtins.trackProvenance "r" { a = 1; b = 2; }) // { b = 3; c = 4; }"#,
            Origin::String,
        )
        .unwrap();
    let Value::Attrs(merged) = state.value(value).clone() else {
        panic!("expected a record");
    };
    let (a, b, c) = (
        state.symbols.create("a"),
        state.symbols.create("b"),
        state.symbols.create("c"),
    );
    let view = state.mem.bindings().get(merged);
    assert!(view.lineage(a).is_some());
    assert!(view.lineage(b).is_none());
    assert!(view.lineage(c).is_none());
    assert_eq!(view.tracking_path(), &[a]);
}

#[test]
fn lineage_moves_with_selection_and_variables() {
    let rendered = eval(
        r#"
        let
          r = builtins.trackProvenance "r" { a = { b = 1; }; };
          alias = r.a;
        in (builtins.getProvenance alias).identifier
        "#,
    );
    assert_eq!(rendered, json!("r"));
}

#[test]
fn stats_count_lineage_nodes() {
    let mut state = tracking_state();
    eval_with(
        &mut state,
        r#"
        let a = builtins.trackProvenance "a" 1;
        in builtins.getProvenance (a + 1)
        "#,
    );
    let stats = state.stats();
    assert_eq!(stats.nr_provenance_nodes, 2);
    assert!(stats.nr_tracked_values >= 2);
    assert!(stats.nr_attrsets >= 2);
}

fn attr_name() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_filter("keywords are not names", |name| {
        !matches!(name.as_str(), "let" | "in")
    })
}

fn literal() -> impl Strategy<Value = String> {
    let scalar = prop_oneof![
        // Parenthesized so negative numbers also work as list elements
        any::<i32>().prop_map(|n| format!("({n})")),
        "[a-z ]{0,12}".prop_map(|text| format!("\"{text}\"")),
        Just("null".to_owned()),
        Just("true".to_owned()),
    ];
    scalar.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| format!("[ {} ]", items.join(" "))),
            prop::collection::btree_map(attr_name(), inner, 0..4).prop_map(|attrs| {
                let attrs: Vec<String> = attrs
                    .iter()
                    .map(|(name, value)| format!("{name} = {value};"))
                    .collect();
                format!("{{ {} }}", attrs.join(" "))
            }),
        ]
    })
}

proptest! {
    #[test]
    fn removed_values_never_carry_lineage(value in literal()) {
        let code = format!(
            r#"builtins.getProvenance (builtins.removeProvenance (builtins.trackProvenance "k" ({value})))"#
        );
        prop_assert_eq!(eval(&code), json!(null));
    }

    #[test]
    fn chains_nest_one_dependency_per_step(steps in 1usize..12) {
        let mut code = String::from("let\n  v0 = builtins.trackProvenance \"id0\" 7;\n");
        for step in 1..=steps {
            code.push_str(&format!(
                "  v{step} = builtins.trackProvenance \"id{step}\" v{};\n",
                step - 1
            ));
        }
        code.push_str(&format!("in builtins.getProvenance v{steps}"));

        let mut node = eval(&code);
        prop_assert_eq!(&node["value"], &json!(7));
        for step in (0..=steps).rev() {
            prop_assert_eq!(&node["identifier"], &json!(format!("id{step}")));
            prop_assert_eq!(&node["kind"], &json!("definition"));
            // Each step sees the previous binding still unevaluated
            let line = if step == 0 { 2 } else { step + 1 };
            prop_assert_eq!(&node["provenance"]["line"], &json!(line));
            let deps = node["dependencies"].as_array().unwrap().clone();
            if step == 0 {
                prop_assert!(deps.is_empty());
                break;
            }
            prop_assert_eq!(deps.len(), 1);
            node = deps[0].clone();
            prop_assert_eq!(&node["value"], &json!(null));
        }
    }
}
