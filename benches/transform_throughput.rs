//! Transformation throughput benchmarks
//!
//! Measures:
//! - Stylesheet compilation
//! - Rule matching and template instantiation over documents of 10 to 10000 records
//! - XPath evaluation with a warm expression cache
//!
//! Run benchmarks: `cargo bench --bench transform_throughput`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::Rc;
use trellis::xpath::{EvaluationContext, ExpressionCache, StaticEnvironment, evaluate};
use trellis::{Compiler, Document, Node, Processor};

const STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output omit-xml-declaration="yes"/>
  <xsl:key name="by-group" match="record" use="@group"/>
  <xsl:template match="/">
    <summary groups="{count(records/record[generate-id() = generate-id(key('by-group', @group)[1])])}">
      <xsl:apply-templates select="records/record">
        <xsl:sort select="@value" data-type="number" order="descending"/>
      </xsl:apply-templates>
    </summary>
  </xsl:template>
  <xsl:template match="record[@value mod 10 = 0]">
    <round id="{@id}"><xsl:value-of select="name"/></round>
  </xsl:template>
  <xsl:template match="record">
    <row id="{@id}" group="{@group}"><xsl:value-of select="concat(name, ': ', @value)"/></row>
  </xsl:template>
</xsl:stylesheet>"#;

/// Generate a source document with `count` records
fn generate_records(count: usize) -> String {
    let mut xml = String::from("<records>");
    for i in 0..count {
        xml.push_str(&format!(
            r#"<record id="r{}" group="g{}" value="{}"><name>Record {}</name></record>"#,
            i,
            i % 7,
            (i * 37) % 1000,
            i
        ));
    }
    xml.push_str("</records>");
    xml
}

fn benchmark_compile(c: &mut Criterion) {
    c.bench_function("compile_stylesheet", |b| {
        b.iter(|| Compiler::new().compile_str(black_box(STYLESHEET), None).unwrap())
    });
}

/// Benchmark full transformations with varying record counts
fn benchmark_transform_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_throughput");
    let stylesheet = Compiler::new().compile_str(STYLESHEET, None).unwrap();
    let processor = Processor::new(stylesheet);

    for count in [10, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(count as u64));
        let source = Rc::new(Document::parse_str(&generate_records(count)).unwrap());
        group.bench_with_input(BenchmarkId::new("records", count), &source, |b, source| {
            b.iter(|| processor.transform(black_box(source)).unwrap())
        });
    }
    group.finish();
}

fn benchmark_xpath(c: &mut Criterion) {
    let mut group = c.benchmark_group("xpath_evaluation");
    let source = Rc::new(Document::parse_str(&generate_records(1000)).unwrap());
    let env = StaticEnvironment::new();
    let ctx = EvaluationContext::new(Node::root(&source), 1, 1, &env);
    let mut cache = ExpressionCache::default();

    for expression in [
        "count(//record[@group = 'g3'])",
        "//record[last()]/preceding-sibling::record[10]/name",
        "sum(//record/@value) div count(//record)",
    ] {
        let parsed = cache.get_or_parse(expression).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(expression), &parsed, |b, parsed| {
            b.iter(|| evaluate(black_box(parsed), &ctx).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_transform_throughput, benchmark_xpath);
criterion_main!(benches);
