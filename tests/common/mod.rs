#![allow(dead_code)]

use symgraph::db::Db;
use symgraph::graph::SymbolGraph;
use symgraph::model::{Confidence, RefKind, Reference, Symbol, SymbolKind};
use tempfile::TempDir;

pub struct TempStore {
    // Held so the directory outlives the store.
    pub dir: TempDir,
    pub db: Db,
}

impl TempStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::create(&dir.path().join(".symgraph").join("symgraph.sqlite")).unwrap();
        Self { dir, db }
    }

    pub fn with_graph(graph: &SymbolGraph) -> Self {
        let store = Self::new();
        store.db.replace_graph(graph).unwrap();
        store
    }
}

pub fn id(file: &str, qualified_name: &str) -> String {
    Symbol::derive_id(file, qualified_name)
}

pub const FORM: &str = "web/templates/order_form.html";
pub const CART: &str = "web/static/cart.js";
pub const VIEWS: &str = "billing/views.py";
pub const MODELS: &str = "billing/models.py";
pub const SERVICES: &str = "billing/services.py";
pub const REPORTS: &str = "reports/monthly.py";
pub const TESTS: &str = "tests/test_orders.py";
pub const DOCS: &str = "docs/billing.md";
pub const SCHEMA: &str = "db/schema.sql";

pub fn form_total() -> String {
    id(FORM, "order_form.total")
}
pub fn form_email() -> String {
    id(FORM, "order_form.email")
}
pub fn cart_quantity() -> String {
    id(CART, "cart.Cart.quantity")
}
pub fn submit_order() -> String {
    id(VIEWS, "billing.views.submit_order")
}
pub fn validate() -> String {
    id(VIEWS, "billing.views.validate")
}
pub fn order() -> String {
    id(MODELS, "billing.models.Order")
}
pub fn order_total() -> String {
    id(MODELS, "billing.models.Order.total")
}
pub fn order_email() -> String {
    id(MODELS, "billing.models.Order.email")
}
pub fn order_discount() -> String {
    id(MODELS, "billing.models.Order.discount")
}
pub fn recalc() -> String {
    id(SERVICES, "billing.services.OrderService.recalc")
}
pub fn monthly_totals() -> String {
    id(REPORTS, "reports.monthly.monthly_totals")
}
pub fn test_total() -> String {
    id(TESTS, "tests.test_orders.test_total")
}

/// A small order-entry application spanning every layer:
///
/// ```text
/// order_form.total --submits(medium)--> submit_order --writes(low)--> Order.total --maps_to--> db::orders.total
/// order_form.email --binds_to--> Order.email --maps_to(medium)--> db::orders.email
/// Cart.quantity --calls--> submit_order --calls--> validate
/// OrderService.recalc --reads--> Order.total <--reads-- monthly_totals
/// test_total --calls--> OrderService.recalc
/// ```
pub fn billing_graph() -> SymbolGraph {
    let mut graph = SymbolGraph::new();
    let symbols = [
        Symbol::new(SymbolKind::Template, "order_form", "order_form", FORM, 1, 40),
        Symbol::new(SymbolKind::ViewBinding, "total", "order_form.total", FORM, 12, 12),
        Symbol::new(SymbolKind::FormField, "email", "order_form.email", FORM, 14, 14),
        Symbol::new(SymbolKind::Component, "Cart", "cart.Cart", CART, 1, 80),
        Symbol::new(SymbolKind::StateField, "quantity", "cart.Cart.quantity", CART, 5, 5),
        Symbol::new(SymbolKind::Endpoint, "submit_order", "billing.views.submit_order", VIEWS, 10, 30)
            .with_label("POST /orders"),
        Symbol::new(SymbolKind::Function, "validate", "billing.views.validate", VIEWS, 32, 45),
        Symbol::new(SymbolKind::Class, "BaseModel", "billing.models.BaseModel", MODELS, 1, 8),
        Symbol::new(SymbolKind::Entity, "Order", "billing.models.Order", MODELS, 10, 40)
            .with_attribute("table", "orders"),
        Symbol::new(SymbolKind::EntityField, "total", "billing.models.Order.total", MODELS, 12, 12)
            .with_attribute("column", "total")
            .with_attribute("nullable", false),
        Symbol::new(SymbolKind::EntityField, "email", "billing.models.Order.email", MODELS, 13, 13)
            .with_attribute("column", "email"),
        Symbol::new(SymbolKind::EntityField, "discount", "billing.models.Order.discount", MODELS, 14, 14),
        Symbol::new(SymbolKind::Service, "OrderService", "billing.services.OrderService", SERVICES, 1, 60),
        Symbol::new(SymbolKind::Method, "recalc", "billing.services.OrderService.recalc", SERVICES, 20, 35),
        Symbol::new(SymbolKind::Function, "monthly_totals", "reports.monthly.monthly_totals", REPORTS, 3, 25),
        Symbol::new(SymbolKind::Function, "test_total", "tests.test_orders.test_total", TESTS, 5, 15),
        Symbol::new(SymbolKind::DocSection, "Order totals", "billing.order_totals", DOCS, 1, 30),
        Symbol::new(SymbolKind::DocHeading, "Recalculation", "billing.order_totals.recalculation", DOCS, 12, 12),
        Symbol::new(SymbolKind::Table, "orders", "orders", SCHEMA, 1, 12),
        Symbol::new(SymbolKind::Column, "total", "orders.total", SCHEMA, 4, 4),
    ];
    for symbol in symbols {
        graph.add_symbol(symbol);
    }

    let references = [
        Reference::new(form_total(), submit_order(), RefKind::Submits)
            .with_confidence(Confidence::Medium),
        Reference::new(submit_order(), order_total(), RefKind::Writes)
            .with_confidence(Confidence::Low)
            .with_evidence("line", 22),
        Reference::new(order_total(), "db::orders.total", RefKind::MapsTo),
        Reference::new(form_email(), order_email(), RefKind::BindsTo),
        Reference::new(order_email(), "db::orders.email", RefKind::MapsTo)
            .with_confidence(Confidence::Medium),
        Reference::new(cart_quantity(), submit_order(), RefKind::Calls),
        Reference::new(submit_order(), validate(), RefKind::Calls),
        Reference::new(order(), order_total(), RefKind::Contains),
        Reference::new(order(), order_email(), RefKind::Contains),
        Reference::new(order(), id(MODELS, "billing.models.BaseModel"), RefKind::Extends),
        Reference::new(recalc(), order_total(), RefKind::Reads),
        Reference::new(monthly_totals(), order_total(), RefKind::Reads)
            .with_confidence(Confidence::Inferred),
        Reference::new(test_total(), recalc(), RefKind::Calls),
    ];
    for reference in references {
        graph.add_reference(reference);
    }
    graph
}
