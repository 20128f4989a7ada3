mod common;

use common::{TestResult, XSL_HEADER, text_stylesheet, transform, transform_with_provider};
use std::fs;
use std::rc::Rc;
use trellis::{CompileError, Compiler, DocumentProvider, Processor, TransformConfig, TransformError, TreeError};

#[test]
fn test_document_function_reads_registered_documents() -> TestResult {
    let provider = Rc::new(DocumentProvider::new());
    provider.insert(
        "codes.xml",
        r#"<codes><code k="no">Norway</code><code k="se">Sweden</code></codes>"#,
    );
    let xsl = text_stylesheet(
        r#"<xsl:variable name="codes" select="document('codes.xml')/codes"/>
           <xsl:template match="/">
             <xsl:for-each select="orders/order">
               <xsl:value-of select="$codes/code[@k = current()/@country]"/>
               <xsl:text>;</xsl:text>
             </xsl:for-each>
           </xsl:template>"#,
    );
    let result = transform_with_provider(
        provider,
        &xsl,
        None,
        r#"<orders><order country="se"/><order country="no"/></orders>"#,
    )?;
    assert_eq!(result.serialize()?, "Sweden;Norway;");
    Ok(())
}

#[test]
fn test_document_function_returns_the_same_tree_for_one_uri() -> TestResult {
    let provider = Rc::new(DocumentProvider::new());
    provider.insert("shared.xml", "<shared><item/></shared>");
    let xsl = text_stylesheet(
        r#"<xsl:template match="/">
             <xsl:value-of select="count(document('shared.xml') | document('shared.xml'))"/>
             <xsl:text>,</xsl:text>
             <xsl:value-of select="generate-id(document('shared.xml')) = generate-id(document('shared.xml'))"/>
           </xsl:template>"#,
    );
    let result = transform_with_provider(provider, &xsl, None, "<a/>")?;
    assert_eq!(result.serialize()?, "1,true");
    Ok(())
}

#[test]
fn test_stylesheets_and_documents_load_from_disk() -> TestResult {
    common::init_logging();
    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("lib"))?;
    fs::write(
        dir.path().join("lib").join("format.xsl"),
        format!(
            r#"{}<xsl:template name="price"><xsl:param name="amount"/><xsl:value-of select="concat(document('currency.xml')/currency/@symbol, $amount)"/></xsl:template></xsl:stylesheet>"#,
            XSL_HEADER
        ),
    )?;
    fs::write(dir.path().join("lib").join("currency.xml"), r#"<currency symbol="kr "/>"#)?;
    fs::write(
        dir.path().join("main.xsl"),
        format!(
            r#"{}<xsl:import href="lib/format.xsl"/><xsl:output method="text"/>
               <xsl:template match="item"><xsl:call-template name="price"><xsl:with-param name="amount" select="@cost"/></xsl:call-template><xsl:text>
</xsl:text></xsl:template></xsl:stylesheet>"#,
            XSL_HEADER
        ),
    )?;

    let uri = dir.path().join("main.xsl").display().to_string();
    let stylesheet = Compiler::new().compile_uri(&uri)?;
    let source = common::parse(r#"<cart><item cost="10"/><item cost="25"/></cart>"#)?;
    let out = Processor::new(stylesheet).transform_to_string(&source)?;
    assert_eq!(out, "kr 10\nkr 25\n");
    Ok(())
}

#[test]
fn test_circular_imports_are_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    for (name, target) in [("a.xsl", "b.xsl"), ("b.xsl", "a.xsl")] {
        fs::write(
            dir.path().join(name),
            format!(r#"{}<xsl:import href="{}"/></xsl:stylesheet>"#, XSL_HEADER, target),
        )?;
    }
    let uri = dir.path().join("a.xsl").display().to_string();
    let err = Compiler::new().compile_uri(&uri).unwrap_err();
    assert!(
        matches!(err.kind(), CompileError::CircularImport(uri) if uri.ends_with("a.xsl")),
        "got {:?}",
        err
    );
    Ok(())
}

#[test]
fn test_missing_documents_are_reported() {
    let xsl = text_stylesheet(r#"<xsl:template match="/"><xsl:value-of select="document('/no/such/file.xml')"/></xsl:template>"#);
    let err = transform(&xsl, "<a/>").unwrap_err();
    assert!(matches!(err, trellis::Error::Transform(TransformError::XPath(_))), "got {:?}", err);
}

#[test]
fn test_source_whitespace_stripping() -> TestResult {
    let xsl = text_stylesheet(
        r#"<xsl:strip-space elements="*"/>
           <xsl:preserve-space elements="pre"/>
           <xsl:template match="/">
             <xsl:value-of select="count(doc/node())"/>
             <xsl:text>,</xsl:text>
             <xsl:value-of select="count(doc/pre/node())"/>
           </xsl:template>"#,
    );
    let source = "<doc>\n  <p>x</p>\n  <pre>  </pre>\n</doc>";
    assert_eq!(transform(&xsl, source)?, "2,1");

    let config = TransformConfig {
        strip_source_whitespace: false,
        ..TransformConfig::default()
    };
    assert_eq!(trellis::transform_str_with_config(&xsl, source, config)?, "5,1");
    Ok(())
}

#[test]
fn test_config_from_json_limits_recursion() -> TestResult {
    let config = TransformConfig::from_json(r#"{ "maxDepth": 20, "vendor": "acme" }"#)?;
    let xsl = text_stylesheet(
        r#"<xsl:template match="/"><xsl:value-of select="system-property('xsl:vendor')"/><xsl:call-template name="down"/></xsl:template>
           <xsl:template name="down"><xsl:call-template name="down"/></xsl:template>"#,
    );
    let err = trellis::transform_str_with_config(&xsl, "<a/>", config).unwrap_err();
    assert!(
        matches!(err, trellis::Error::Transform(TransformError::RecursionLimit(20))),
        "got {:?}",
        err
    );
    Ok(())
}

#[test]
fn test_config_files_are_loaded_and_checked() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = dir.path().join("good.json");
    fs::write(&good, r#"{ "vendor": "acme", "stripSourceWhitespace": false }"#)?;
    let config = trellis::load_config(&good.display().to_string())?;
    assert_eq!(config.vendor, "acme");
    assert!(!config.strip_source_whitespace);
    assert_eq!(config.max_depth, TransformConfig::default().max_depth);

    let bad = dir.path().join("bad.json");
    fs::write(&bad, r#"{ "maxDepth": "deep" }"#)?;
    let err = trellis::load_config(&bad.display().to_string()).unwrap_err();
    assert!(matches!(err, trellis::Error::Config(_)), "got {:?}", err);

    let missing = dir.path().join("missing.json");
    let err = trellis::load_config(&missing.display().to_string()).unwrap_err();
    assert!(matches!(err, trellis::Error::Tree(TreeError::Io { .. })), "got {:?}", err);
    Ok(())
}
