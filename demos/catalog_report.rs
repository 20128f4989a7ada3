// FILE: demos/catalog_report.rs
use std::collections::HashMap;
use std::env;
use std::fs;
use std::rc::Rc;
use trellis::{Compiler, Document, Error, ExpandedName, Processor, TransformConfig, Value};

fn main() -> Result<(), Error> {
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "trellis_xslt=info"); }
    }
    env_logger::init();

    println!("Running catalog report example...");

    // Optional JSON configuration, e.g. `{ "maxDepth": 200, "vendor": "catalog-demo" }`.
    let config = match env::args().nth(1) {
        Some(path) => trellis::load_config(&path)?,
        None => TransformConfig::default(),
    };

    let template_path = "demos/templates/catalog.xsl";
    let stylesheet = Compiler::new().with_config(&config).compile_uri(template_path)?;
    println!("✓ Compiled {} ({} rules in the top-level module)", template_path, stylesheet.rule_count());

    let data_path = "demos/data/catalog.xml";
    let text = fs::read_to_string(data_path).map_err(|source| trellis::TreeError::Io {
        path: data_path.to_string(),
        source,
    })?;
    let source = Rc::new(Document::parse_str(&text)?);
    println!("✓ Data loaded.");

    let mut params = HashMap::new();
    params.insert(ExpandedName::local("currency"), Value::String("NOK".to_string()));

    let processor = Processor::new(stylesheet).with_config(config);
    let result = processor.transform_with_params(&source, params)?;
    for message in &result.messages {
        println!("message: {}", message);
    }

    println!("\n{}", result.serialize()?);
    Ok(())
}
