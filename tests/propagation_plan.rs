mod common;

use anyhow::Result;
use common::*;
use symgraph::graph::SymbolGraph;
use symgraph::model::{Confidence, RefKind, Reference, Symbol, SymbolKind};
use symgraph::propagation::{
    ChangeKind, FieldChange, NO_INTERNAL_REFS, PatchGenerator, Planner, PropagationPlan,
    REASON_ADDITIVE, REASON_MANY_FILES, REASON_MANY_REFS, Risk, TextEdit,
};

#[test]
fn renaming_a_widely_used_field_is_high_risk() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order_total(), ChangeKind::RenameField, 5)
        .unwrap();

    let upstream: Vec<&str> = plan.upstream.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(upstream.len(), 7);
    assert!(upstream.contains(&form_total().as_str()));
    assert!(upstream.contains(&test_total().as_str()));
    assert_eq!(plan.files_affected.len(), 7);
    assert_eq!(plan.risk, Risk::High);
    assert!(plan.reasons.iter().any(|r| r == REASON_MANY_FILES));
    assert!(plan.breaking);
    assert_eq!(plan.confidence, Confidence::High);
    assert_eq!(plan.test_coverage, 1);

    assert!(plan.direct.iter().any(|s| s.id == "db::orders.total"));
    assert!(plan.downstream.iter().any(|s| s.id == "db::orders.total"));
    assert!(!plan.files_affected.contains(""));
}

#[test]
fn renaming_a_narrowly_used_field_is_medium_risk() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order_email(), ChangeKind::RenameField, 5)
        .unwrap();
    assert_eq!(plan.upstream.len(), 2);
    assert_eq!(
        plan.files_affected.iter().map(String::as_str).collect::<Vec<_>>(),
        vec![MODELS, FORM]
    );
    assert_eq!(plan.risk, Risk::Medium);
    assert!(plan.breaking);
    assert_eq!(plan.test_coverage, 0);
}

#[test]
fn removing_an_unreferenced_field_is_still_high_risk() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order_discount(), ChangeKind::RemoveField, 5)
        .unwrap();
    assert!(plan.upstream.is_empty());
    assert!(plan.impacted_ids().is_empty());
    assert_eq!(plan.risk, Risk::High);
    assert!(plan.reasons.iter().any(|r| r == NO_INTERNAL_REFS));
    assert!(plan.breaking);
    assert_eq!(plan.confidence, Confidence::Low);
}

#[test]
fn adding_a_field_is_low_risk_and_non_breaking() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order(), ChangeKind::AddField, 5)
        .unwrap();
    assert_eq!(plan.risk, Risk::Low);
    assert_eq!(plan.reasons, vec![REASON_ADDITIVE.to_string()]);
    assert!(!plan.breaking);
}

#[test]
fn many_callers_in_two_files_is_high_risk() {
    let mut graph = SymbolGraph::new();
    let target = Symbol::new(SymbolKind::Function, "price", "src.pricing.price", "src/pricing.py", 1, 9);
    graph.add_symbol(target.clone());
    for n in 0..12 {
        let file = if n % 2 == 0 { "src/a.py" } else { "src/b.py" };
        let caller = Symbol::new(
            SymbolKind::Function,
            format!("caller_{n}"),
            format!("src.callers.caller_{n}"),
            file,
            n + 1,
            n + 1,
        );
        graph.add_reference(Reference::new(&caller.id, &target.id, RefKind::Calls));
        graph.add_symbol(caller);
    }

    let plan = Planner::new(&graph)
        .plan(&target.id, ChangeKind::RenameField, 3)
        .unwrap();
    assert_eq!(plan.upstream.len(), 12);
    assert_eq!(plan.files_affected.len(), 2);
    assert_eq!(plan.risk, Risk::High);
    assert!(plan.reasons.iter().any(|r| r == REASON_MANY_REFS));
}

#[test]
fn single_caller_is_medium_and_modify_never_breaks() {
    let mut graph = SymbolGraph::new();
    let target = Symbol::new(SymbolKind::Function, "price", "src.pricing.price", "src/pricing.py", 1, 9);
    let caller = Symbol::new(SymbolKind::Function, "checkout", "src.pricing.checkout", "src/pricing.py", 11, 20);
    graph.add_symbol(target.clone());
    graph.add_symbol(caller.clone());
    graph.add_reference(Reference::new(&caller.id, &target.id, RefKind::Calls));

    let planner = Planner::new(&graph);
    let rename = planner.plan(&target.id, ChangeKind::RenameField, 3).unwrap();
    assert_eq!(rename.risk, Risk::Medium);
    let modify = planner.plan(&target.id, ChangeKind::Modify, 3).unwrap();
    assert_eq!(modify.risk, Risk::Medium);
    assert!(!modify.breaking);
}

#[test]
fn unknown_target_has_no_plan() {
    let graph = billing_graph();
    assert!(Planner::new(&graph).plan("nope::x", ChangeKind::RenameField, 3).is_none());
}

/// Renames a field on every impacted line, the way a language generator would.
struct LineRenamer;

impl PatchGenerator for LineRenamer {
    fn name(&self) -> &str {
        "line-renamer"
    }

    fn generate(&self, plan: &PropagationPlan, change: &FieldChange) -> Result<Vec<TextEdit>> {
        let new_name = change
            .new_name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("rename needs a new name"))?;
        Ok(plan
            .direct
            .iter()
            .filter(|s| !s.file_path.is_empty())
            .map(|s| TextEdit {
                file: s.file_path.clone(),
                line_start: s.line_start,
                line_end: s.line_start,
                replacement: s.name.replace(&change.field, &new_name),
            })
            .collect())
    }
}

#[test]
fn patch_generators_consume_plans() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order_email(), ChangeKind::RenameField, 5)
        .unwrap();
    let generator: Box<dyn PatchGenerator> = Box::new(LineRenamer);

    let change = FieldChange {
        field: "email".to_string(),
        new_name: Some("contact_email".to_string()),
        field_type: None,
    };
    let edits = generator.generate(&plan, &change).unwrap();
    assert_eq!(generator.name(), "line-renamer");
    assert!(edits.iter().any(|edit| edit.file == FORM && edit.replacement == "contact_email"));

    let missing = FieldChange {
        field: "email".to_string(),
        ..Default::default()
    };
    assert!(generator.generate(&plan, &missing).is_err());
}

#[test]
fn plans_serialize_with_uppercase_risk() {
    let graph = billing_graph();
    let plan = Planner::new(&graph)
        .plan(&order_email(), ChangeKind::RenameField, 5)
        .unwrap();
    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(value["risk"], "MEDIUM");
    assert_eq!(value["change"], "rename_field");
    assert_eq!(value["breaking"], true);
}
