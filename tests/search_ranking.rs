mod common;

use common::*;
use symgraph::graph::SymbolGraph;
use symgraph::model::{Domain, Symbol, SymbolKind};
use symgraph::search::{SearchHit, Tier, search_all, search_domain};

fn ids(hits: &[SearchHit]) -> Vec<String> {
    hits.iter().map(|hit| hit.symbol.id.clone()).collect()
}

#[test]
fn exact_name_outranks_prefix_and_full_text() {
    let store = TempStore::with_graph(&billing_graph());
    let hits = search_all(&store.db, "Order", 20, 0).unwrap();

    assert_eq!(hits[0].symbol.id, order());
    assert_eq!(hits[0].tier, Tier::Exact);
    assert_eq!(hits[0].score, 100.0);

    let prefix: Vec<&str> = hits
        .iter()
        .filter(|hit| hit.tier == Tier::Prefix)
        .map(|hit| hit.symbol.name.as_str())
        .collect();
    assert!(prefix.contains(&"OrderService"));
    assert!(prefix.contains(&"order_form"));
    assert!(hits
        .iter()
        .filter(|hit| hit.tier == Tier::Prefix)
        .all(|hit| hit.score == 75.0));

    // Tiers never interleave and a symbol appears once.
    let tiers: Vec<Tier> = hits.iter().map(|hit| hit.tier).collect();
    let mut sorted = tiers.clone();
    sorted.sort_by_key(|tier| *tier as u8);
    assert_eq!(tiers, sorted);
    let mut unique = ids(&hits);
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), hits.len());
}

#[test]
fn full_text_scores_stay_in_band() {
    let store = TempStore::with_graph(&billing_graph());
    let hits = search_all(&store.db, "models", 20, 0).unwrap();
    let full_text: Vec<&SearchHit> = hits.iter().filter(|h| h.tier == Tier::FullText).collect();
    assert!(!full_text.is_empty());
    for hit in full_text {
        assert!(hit.score >= 50.0 && hit.score <= 100.0, "score {}", hit.score);
    }
}

#[test]
fn pages_concatenate_to_the_full_window() {
    let store = TempStore::with_graph(&billing_graph());
    let everything = search_all(&store.db, "order", 8, 0).unwrap();
    assert_eq!(everything.len(), 8);

    let first = search_all(&store.db, "order", 3, 0).unwrap();
    let second = search_all(&store.db, "order", 3, 3).unwrap();
    let third = search_all(&store.db, "order", 3, 6).unwrap();
    let mut paged = ids(&first);
    paged.extend(ids(&second));
    paged.extend(ids(&third));
    assert_eq!(paged[..8], ids(&everything)[..]);
}

#[test]
fn results_are_bounded_and_deterministic() {
    let store = TempStore::with_graph(&billing_graph());
    for limit in [0, 1, 2, 5, 50] {
        let a = search_all(&store.db, "total", limit, 1).unwrap();
        let b = search_all(&store.db, "total", limit, 1).unwrap();
        assert!(a.len() <= limit);
        assert_eq!(a, b);
    }
}

#[test]
fn empty_exclusion_set_does_not_hide_later_tiers() {
    // "Ord" has no exact match, so the prefix tier runs with nothing seen yet.
    let store = TempStore::with_graph(&billing_graph());
    let hits = search_all(&store.db, "Ord", 10, 0).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].tier, Tier::Prefix);
}

#[test]
fn malformed_full_text_query_only_drops_that_tier() {
    // '.' is not valid in a bare full-text term.
    let store = TempStore::with_graph(&billing_graph());
    let hits = search_all(&store.db, "models.Order", 20, 0).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.tier == Tier::QualifiedName));
    assert!(hits.iter().all(|hit| hit.score == 50.0));
    assert!(ids(&hits).contains(&order_total()));
}

#[test]
fn like_wildcards_match_literally() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol(Symbol::new(SymbolKind::Column, "user_id", "users.user_id", "db/schema.sql", 3, 3));
    graph.add_symbol(Symbol::new(SymbolKind::Column, "userXid", "users.userXid", "db/schema.sql", 4, 4));
    let store = TempStore::with_graph(&graph);
    let hits = search_all(&store.db, "user_", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].symbol.name, "user_id");
}

#[test]
fn domain_search_applies_the_same_tiers() {
    let store = TempStore::with_graph(&billing_graph());

    let docs = search_domain(&store.db, "Order", Domain::Docs, 10, 0).unwrap();
    assert_eq!(docs[0].symbol.kind, SymbolKind::DocSection);
    assert_eq!(docs[0].tier, Tier::Prefix);
    assert!(docs.iter().all(|hit| hit.symbol.kind.domain() == Domain::Docs));
    assert!(ids(&docs).contains(&id(DOCS, "billing.order_totals.recalculation")));

    let code = search_domain(&store.db, "Order", Domain::Code, 50, 0).unwrap();
    assert_eq!(code[0].symbol.id, order());
    assert!(code.iter().all(|hit| hit.symbol.kind.domain() == Domain::Code));
}

#[test]
fn blank_queries_return_nothing() {
    let store = TempStore::with_graph(&billing_graph());
    assert!(search_all(&store.db, "   ", 10, 0).unwrap().is_empty());
    assert!(search_all(&store.db, "zzzz_nothing", 10, 0).unwrap().is_empty());
}
