use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde_json::json;

/// Root handler — returns an HTML landing page with project info and links
pub async fn root_handler() -> impl IntoResponse {
    Html(r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
  <title>School Billing API</title>
  <style>
    * { box-sizing: border-box; margin: 0; padding: 0; }
    body { font-family: 'Segoe UI', system-ui, sans-serif; background: #0f172a; color: #e2e8f0; min-height: 100vh; padding: 40px 20px; }
    .container { max-width: 860px; margin: 0 auto; }
    header { text-align: center; margin-bottom: 48px; }
    header h1 { font-size: 2.8rem; font-weight: 800; background: linear-gradient(135deg, #3b82f6, #8b5cf6); -webkit-background-clip: text; -webkit-text-fill-color: transparent; margin-bottom: 8px; }
    header p { color: #94a3b8; font-size: 1.1rem; }
    .badge { display: inline-block; background: #1e293b; border: 1px solid #334155; color: #38bdf8; padding: 4px 12px; border-radius: 20px; font-size: 0.8rem; margin-top: 12px; }
    .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(260px, 1fr)); gap: 16px; margin-bottom: 32px; }
    .card { background: #1e293b; border: 1px solid #334155; border-radius: 12px; padding: 20px; transition: border-color 0.2s; }
    .card:hover { border-color: #3b82f6; }
    .card h3 { font-size: 1rem; font-weight: 600; color: #f1f5f9; margin-bottom: 6px; display: flex; align-items: center; gap: 8px; }
    .card p { font-size: 0.875rem; color: #94a3b8; line-height: 1.5; }
    .card a { color: #38bdf8; text-decoration: none; font-weight: 500; display: inline-block; margin-top: 8px; font-size: 0.875rem; }
    .card a:hover { text-decoration: underline; }
    .routes { background: #1e293b; border: 1px solid #334155; border-radius: 12px; padding: 24px; }
    .routes h2 { font-size: 1.2rem; font-weight: 700; color: #f1f5f9; margin-bottom: 16px; }
    .route-group { margin-bottom: 20px; }
    .route-group h4 { font-size: 0.8rem; font-weight: 600; text-transform: uppercase; letter-spacing: 0.1em; color: #64748b; margin-bottom: 8px; }
    .route-item { display: flex; align-items: flex-start; gap: 12px; padding: 8px 0; border-bottom: 1px solid #0f172a; }
    .route-item:last-child { border-bottom: none; }
    .method { font-size: 0.7rem; font-weight: 700; padding: 2px 8px; border-radius: 4px; min-width: 52px; text-align: center; font-family: monospace; }
    .get { background: #064e3b; color: #34d399; }
    .post { background: #1e3a5f; color: #60a5fa; }
    .put, .patch { background: #451a03; color: #fb923c; }
    .route-path { font-family: monospace; font-size: 0.85rem; color: #e2e8f0; flex: 1; }
    .route-desc { font-size: 0.8rem; color: #64748b; }
    footer { text-align: center; margin-top: 40px; color: #475569; font-size: 0.85rem; }
  </style>
</head>
<body>
<div class="container">
  <header>
    <h1>🏫 School Billing API</h1>
    <p>Monthly invoicing, late-fee accrual and payment settlement on the Ethiopian academic calendar</p>
    <span class="badge">v1.0.0 · REST API · JSON</span>
  </header>

  <div class="grid">
    <div class="card">
      <h3>📖 API Documentation</h3>
      <p>Full interactive Swagger UI. Explore all endpoints, try requests, and view request/response schemas.</p>
      <a href="/docs">Open Swagger UI →</a>
    </div>
    <div class="card">
      <h3>❤️ Health Check</h3>
      <p>Confirm the service is running and check database connectivity status.</p>
      <a href="/health">GET /health →</a>
    </div>
    <div class="card">
      <h3>📅 Ethiopian Calendar</h3>
      <p>Invoices follow the 13 Ethiopian months, anchored to each academic year's New Year date in Gregorian terms.</p>
    </div>
    <div class="card">
      <h3>💰 Settlement Rules</h3>
      <p>Payments settle oldest month first, late fees accrue per configurable rules, and duplicate bank references are rejected.</p>
    </div>
  </div>

  <div class="routes">
    <h2>🗺️ All API Routes</h2>

    <div class="route-group">
      <h4>Academic Years</h4>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/academic-years</span><span class="route-desc">Register an academic year and its New Year anchor</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/academic-years</span><span class="route-desc">List academic years</span></div>
    </div>

    <div class="route-group">
      <h4>Fee Structures</h4>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/fee-structures</span><span class="route-desc">Create a fee structure (supersedes the active one)</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/fee-structures</span><span class="route-desc">List fee structures</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/fee-structures/resolve</span><span class="route-desc">Resolve a grade's structure to its monthly schedule</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/fee-structures/:id</span><span class="route-desc">Get a structure with its line items</span></div>
    </div>

    <div class="route-group">
      <h4>Late Fee Rules</h4>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/late-fee-rules</span><span class="route-desc">Create a fixed or percentage rule</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/late-fee-rules</span><span class="route-desc">List rules</span></div>
      <div class="route-item"><span class="method patch">PATCH</span><span class="route-path">/api/v1/late-fee-rules/:id</span><span class="route-desc">Amend or deactivate a rule</span></div>
    </div>

    <div class="route-group">
      <h4>Invoices</h4>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/invoices/generate</span><span class="route-desc">Generate monthly invoices for a roster (idempotent)</span></div>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/invoices/recompute-late-fees</span><span class="route-desc">Re-assess late fees as of a date</span></div>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/invoices/reset</span><span class="route-desc">Delete a structure's unpaid invoices for regeneration</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/invoices</span><span class="route-desc">List invoices (filter by student, status, structure)</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/invoices/:id</span><span class="route-desc">Get one invoice</span></div>
    </div>

    <div class="route-group">
      <h4>Payments</h4>
      <div class="route-item"><span class="method post">POST</span><span class="route-path">/api/v1/payments</span><span class="route-desc">Record a payment and settle it oldest month first</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/payments</span><span class="route-desc">List payments (filter by student)</span></div>
    </div>

    <div class="route-group">
      <h4>Balances</h4>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/students/:student_ref/balance</span><span class="route-desc">Per-invoice and total balance for a student</span></div>
      <div class="route-item"><span class="method get">GET</span><span class="route-path">/api/v1/classes/:grade_level/overview</span><span class="route-desc">Billing overview for a whole grade</span></div>
    </div>
  </div>

  <footer>
    <p>Built with 🦀 Rust · Axum · SQLx · PostgreSQL</p>
  </footer>
</div>
</body>
</html>"#)
}

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "service": "school-billing",
                "version": "1.0.0"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}
