use anyhow::Result;

/// Print the OpenAPI document for the API so it can be published or diffed
/// without starting the server.
fn main() -> Result<()> {
    let spec = notu::api::openapi();
    println!("{}", spec.to_pretty_json()?);
    Ok(())
}
