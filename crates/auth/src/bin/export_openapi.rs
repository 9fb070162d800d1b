// Export OpenAPI specification as JSON
//
// Usage: cargo run --bin export-openapi > docs/api/auth-openapi.json
//
// Generates the document without starting the server or touching a database.

use otter_auth::openapi::ApiDoc;

fn main() -> anyhow::Result<()> {
    println!("{}", ApiDoc::to_json()?);
    Ok(())
}
