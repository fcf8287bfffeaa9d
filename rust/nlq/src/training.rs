use crate::{
    error::Result,
    query::{QueryEngine, TrainingItem},
};
use tracing::{info, warn};

pub const SCHEMA_DDL: &str = "\
CREATE TABLE vendors (
    id TEXT PRIMARY KEY,
    vendor_id TEXT UNIQUE,
    name TEXT,
    email TEXT,
    phone TEXT,
    address TEXT,
    city TEXT,
    state TEXT,
    country TEXT
);

CREATE TABLE invoices (
    id TEXT PRIMARY KEY,
    invoice_number TEXT UNIQUE,
    vendor_id TEXT,
    invoice_date TIMESTAMP,
    due_date TIMESTAMP,
    status TEXT,
    total_amount DECIMAL,
    amount_paid DECIMAL,
    amount_due DECIMAL,
    category TEXT,
    FOREIGN KEY (vendor_id) REFERENCES vendors(vendor_id)
);

CREATE TABLE line_items (
    id TEXT PRIMARY KEY,
    invoice_id TEXT,
    description TEXT,
    quantity DECIMAL,
    unit_price DECIMAL,
    amount DECIMAL,
    category TEXT,
    FOREIGN KEY (invoice_id) REFERENCES invoices(id)
);

CREATE TABLE payments (
    id TEXT PRIMARY KEY,
    invoice_id TEXT,
    payment_date TIMESTAMP,
    amount DECIMAL,
    payment_method TEXT,
    FOREIGN KEY (invoice_id) REFERENCES invoices(id)
);";

pub const EXAMPLE_QUERIES: [(&str, &str); 3] = [
    (
        "What is the total spend in the last 90 days?",
        "SELECT SUM(total_amount) as total_spend
FROM invoices
WHERE invoice_date >= NOW() - INTERVAL '90 days'
AND status NOT IN ('CANCELLED', 'DRAFT');",
    ),
    (
        "List top 5 vendors by spend",
        "SELECT v.name, SUM(i.total_amount) as total_spend
FROM vendors v
JOIN invoices i ON v.vendor_id = i.vendor_id
WHERE i.status NOT IN ('CANCELLED', 'DRAFT')
GROUP BY v.name
ORDER BY total_spend DESC
LIMIT 5;",
    ),
    (
        "Show overdue invoices",
        "SELECT invoice_number, vendor_id, due_date, amount_due
FROM invoices
WHERE due_date < NOW()
AND status IN ('PENDING', 'APPROVED')
ORDER BY due_date;",
    ),
];

/// Seeds the engine once at startup. The whole sequence shares one failure
/// boundary: a warning, never an aborted boot, and the serving path works
/// whether or not any of it landed.
pub fn run_startup_training(engine: &QueryEngine) {
    match seed(engine) {
        Ok(()) => info!(
            examples = EXAMPLE_QUERIES.len(),
            "trained on schema and example queries"
        ),
        Err(err) => warn!(error = %err, "startup training failed; serving without it"),
    }
}

fn seed(engine: &QueryEngine) -> Result<()> {
    engine.train(TrainingItem::Ddl(SCHEMA_DDL.to_string()))?;
    for (question, sql) in EXAMPLE_QUERIES {
        engine.train(TrainingItem::Example {
            question: question.to_string(),
            sql: sql.to_string(),
        })?;
    }
    Ok(())
}
