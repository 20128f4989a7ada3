// FILE: demos/xpath_explorer.rs
//
// Evaluates XPath expressions against the demo catalog and prints each result.
// Pass expressions as arguments to try your own:
//
//   cargo run --example xpath_explorer -- "count(//product)" "//product[price > 20]/name"
use itertools::Itertools;
use std::env;
use std::fs;
use std::rc::Rc;
use trellis::xpath::{EvaluationContext, ExpressionCache, StaticEnvironment, XPathValue, evaluate};
use trellis::{DataSourceNode, Document, ExpandedName, Node};

const DEFAULT_EXPRESSIONS: &[&str] = &[
    "count(//product)",
    "//product[price > 20]/name",
    "sum(//product[@category = 'tools']/price)",
    "//product[last()]/preceding-sibling::product[1]/@sku",
    "//name[starts-with(., 'H')] | //product[@discontinued]/name",
    "string(//product[2]/price * 2)",
];

fn describe(value: &XPathValue<Node>) -> String {
    match value {
        XPathValue::NodeSet(nodes) if nodes.is_empty() => "(empty node-set)".to_string(),
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .map(|node| format!("{:?} {:?}", node.node_type(), node.string_value()))
            .join("\n    "),
        other => format!("{:?}", other),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let text = fs::read_to_string("demos/data/catalog.xml")?;
    let strip = |_: &ExpandedName| true;
    let doc = Rc::new(Document::parse_str(&text)?.strip_whitespace(&strip));
    println!("✓ Loaded catalog as document {}", doc.id());

    let arguments: Vec<String> = env::args().skip(1).collect();
    let expressions: Vec<&str> = if arguments.is_empty() {
        DEFAULT_EXPRESSIONS.to_vec()
    } else {
        arguments.iter().map(String::as_str).collect()
    };

    let mut cache = ExpressionCache::default();
    let env = StaticEnvironment::new();
    let ctx = EvaluationContext::new(Node::root(&doc), 1, 1, &env);
    for source in expressions {
        let parsed = cache.get_or_parse(source)?;
        match evaluate(&parsed, &ctx) {
            Ok(value) => println!("{}\n    {}", source, describe(&value)),
            Err(err) => println!("{}\n    error: {}", source, err),
        }
    }
    Ok(())
}
