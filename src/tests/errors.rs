use super::translate;
use crate::{CompileOptions, OutputTarget, ShaderStage};

fn fail(source: &str) -> String {
    let output = translate(
        source,
        ShaderStage::Vertex,
        OutputTarget::Essl,
        CompileOptions::empty(),
    );
    assert!(!output.success, "expected failure, log: {}", output.info_log);
    assert!(output.object_code.is_none());
    output.info_log
}

#[test]
fn function_name_reused_as_variable() {
    let log = fail("float fun(float a) { return a; } float fun;\
                    void main() { gl_Position = vec4(fun(1.0)); }");
    assert!(log.contains("fun"), "log: {}", log);
}

#[test]
fn unsupported_version_rejected() {
    let log = fail("#version 200\nvoid main() { gl_Position = vec4(0.0); }");
    assert!(log.contains("version"), "log: {}", log);
}

#[test]
fn undeclared_identifier_named_in_log() {
    let log = fail("void main() { gl_Position = missing; }");
    assert!(log.contains("'missing' : undeclared identifier"), "log: {}", log);
}

#[test]
fn missing_main_fails_the_compile() {
    let log = fail("attribute vec4 position;");
    assert!(log.contains("main"), "log: {}", log);
}

#[test]
fn type_mismatch_fails_the_compile() {
    let log = fail("void main() { gl_Position = 1; }");
    assert!(!log.is_empty());
}

#[test]
fn recovery_reports_multiple_errors() {
    let output = translate(
        "void main() { gl_Position = first_missing; gl_Position = second_missing; }",
        ShaderStage::Vertex,
        OutputTarget::Essl,
        CompileOptions::empty(),
    );
    assert!(!output.success);
    assert!(output.info_log.contains("first_missing"));
    assert!(output.info_log.contains("second_missing"));
}
