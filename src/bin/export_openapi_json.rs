use course_certify::api::get_openapi_json;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or("openapi.json".to_string());
    std::fs::write(path, get_openapi_json()?)?;
    Ok(())
}
