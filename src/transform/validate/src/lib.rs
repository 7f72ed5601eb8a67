//! Whole-module validation rules that need the finished typed IR.
//!
//! The typer reports what it can while types are still being resolved; the
//! checks here want a complete module: entry point presence, qualifier
//! legality per storage class, constant-ness of global initializers, opaque
//! type restrictions and switch case labels. The walk never mutates.

use std::collections::HashSet;

use esslt_lang_hir::{
    CaseLabel, ExprKind, GlobalStorage, Interpolation, Module, ScalarType, Statement, TypeLayout,
};
use esslt_shared::{DiagnosticId, Diagnostics, ShaderStage, SourceLocation};

pub fn validate(module: &Module, diagnostics: &mut Diagnostics) {
    let mut validator = Validator {
        module,
        diagnostics,
    };
    validator.run();
}

struct Validator<'a> {
    module: &'a Module,
    diagnostics: &'a mut Diagnostics,
}

/// Strips array dimensions off a layout.
fn element(layout: &TypeLayout) -> &TypeLayout {
    match *layout {
        TypeLayout::Array(ref inner, _) => element(inner),
        _ => layout,
    }
}

fn contains_opaque(module: &Module, layout: &TypeLayout) -> bool {
    match *layout {
        TypeLayout::Sampler(_) => true,
        TypeLayout::Array(ref inner, _) => contains_opaque(module, inner),
        TypeLayout::Struct(id) => module
            .struct_def(id)
            .members
            .iter()
            .any(|m| contains_opaque(module, &m.ty.layout)),
        _ => false,
    }
}

impl<'a> Validator<'a> {
    fn report(&mut self, id: DiagnosticId, loc: SourceLocation, text: impl Into<String>) {
        self.diagnostics.report(id, loc, text);
    }

    fn run(&mut self) {
        let module = self.module;
        if module.main_function().is_none() {
            self.report(
                DiagnosticId::MainMissing,
                SourceLocation::none(),
                "missing entry point: void main() not defined",
            );
        }
        self.check_structs();
        self.check_globals();
        self.check_blocks();
        for function in &module.functions {
            for param in &function.params {
                // Opaque parameters are read-only pass-through
                if contains_opaque(module, &param.ty.layout)
                    && param.direction != esslt_lang_hir::ParamDirection::In
                {
                    self.report(
                        DiagnosticId::OpaqueTypeAssignment,
                        SourceLocation::none(),
                        format!("'{}' : opaque parameters must be 'in'", param.name),
                    );
                }
            }
            // Locals beyond the parameters cannot hold opaque types
            for local in function.locals.iter().skip(function.params.len()) {
                if contains_opaque(module, &local.ty.layout) {
                    self.report(
                        DiagnosticId::OpaqueTypeAssignment,
                        SourceLocation::none(),
                        format!("'{}' : samplers cannot be declared locally", local.name),
                    );
                }
            }
            self.check_statements(&function.body);
        }
        self.check_assignments();
    }

    fn check_structs(&mut self) {
        let module = self.module;
        for def in &module.structs {
            for member in &def.members {
                if member.ty.layout == TypeLayout::Void {
                    self.report(
                        DiagnosticId::InvalidStructField,
                        SourceLocation::none(),
                        format!("'{}' : fields cannot be void", member.name),
                    );
                }
                if matches!(element(&member.ty.layout), TypeLayout::Sampler(_))
                    && !module.version.supports_samplers_in_structs()
                {
                    self.report(
                        DiagnosticId::OpaqueTypeInStruct,
                        SourceLocation::none(),
                        format!(
                            "'{}' : samplers in structs require #version 310 es",
                            member.name
                        ),
                    );
                }
            }
        }
    }

    fn check_globals(&mut self) {
        let module = self.module;
        let version = module.version;
        let stage = module.stage;
        for global in &module.globals {
            let loc = SourceLocation::none();
            let opaque = contains_opaque(module, &global.ty.layout);

            match global.storage {
                GlobalStorage::Const => {
                    match global.init {
                        Some(init) => {
                            if !module.is_const_expr(init) {
                                self.report(
                                    DiagnosticId::GlobalInitializerNotConst,
                                    module.expr(init).loc,
                                    format!(
                                        "'{}' : global initializer must be constant",
                                        global.name
                                    ),
                                );
                            }
                        }
                        None => {
                            self.report(
                                DiagnosticId::ConstRequiresInitializer,
                                loc,
                                format!("'{}' : const requires an initializer", global.name),
                            );
                        }
                    }
                    if opaque {
                        self.report(
                            DiagnosticId::InvalidQualifierCombination,
                            loc,
                            format!("'{}' : samplers cannot be const", global.name),
                        );
                    }
                }
                GlobalStorage::Uniform => {
                    if global.init.is_some() {
                        self.report(
                            DiagnosticId::QualifierNotAllowed,
                            loc,
                            format!("'{}' : uniforms cannot be initialized", global.name),
                        );
                    }
                }
                GlobalStorage::Input | GlobalStorage::Output => {
                    if global.init.is_some() {
                        self.report(
                            DiagnosticId::QualifierNotAllowed,
                            loc,
                            format!(
                                "'{}' : shader interface variables cannot be initialized",
                                global.name
                            ),
                        );
                    }
                    if opaque {
                        self.report(
                            DiagnosticId::InvalidQualifierCombination,
                            loc,
                            format!("'{}' : samplers must be uniforms", global.name),
                        );
                    }
                    self.check_interface_variable(global, version, stage);
                }
                GlobalStorage::Plain => {
                    if let Some(init) = global.init {
                        if !module.is_const_expr(init) {
                            self.report(
                                DiagnosticId::GlobalInitializerNotConst,
                                module.expr(init).loc,
                                format!(
                                    "'{}' : global initializer must be constant",
                                    global.name
                                ),
                            );
                        }
                    }
                    if opaque {
                        self.report(
                            DiagnosticId::InvalidQualifierCombination,
                            loc,
                            format!("'{}' : samplers must be uniforms", global.name),
                        );
                    }
                }
            }

            if global.location.is_some()
                && !matches!(
                    global.storage,
                    GlobalStorage::Input | GlobalStorage::Output | GlobalStorage::Uniform
                )
            {
                self.report(
                    DiagnosticId::LayoutQualifierNotAllowed,
                    loc,
                    format!(
                        "'{}' : location does not apply to this storage",
                        global.name
                    ),
                );
            }
            if global.invariant && global.storage != GlobalStorage::Output {
                self.report(
                    DiagnosticId::InvalidQualifierCombination,
                    loc,
                    format!("'{}' : only outputs can be invariant", global.name),
                );
            }
            if global.interpolation.is_some()
                && !matches!(
                    global.storage,
                    GlobalStorage::Input | GlobalStorage::Output
                )
            {
                self.report(
                    DiagnosticId::InvalidQualifierCombination,
                    loc,
                    format!(
                        "'{}' : interpolation only applies to inputs and outputs",
                        global.name
                    ),
                );
            }
        }
    }

    /// Attribute/varying (and `in`/`out`) shape rules.
    fn check_interface_variable(
        &mut self,
        global: &esslt_lang_hir::GlobalVariable,
        version: esslt_shared::ShaderVersion,
        stage: ShaderStage,
    ) {
        let loc = SourceLocation::none();
        let layout = &global.ty.layout;
        let base = element(layout);

        if matches!(base, TypeLayout::Struct(_)) && version == esslt_shared::ShaderVersion::Essl100
        {
            self.report(
                DiagnosticId::InvalidQualifierCombination,
                loc,
                format!(
                    "'{}' : structs are not allowed on the shader interface",
                    global.name
                ),
            );
            return;
        }

        let scalar = base.to_scalar();
        if scalar == Some(ScalarType::Bool) {
            self.report(
                DiagnosticId::InvalidQualifierCombination,
                loc,
                format!("'{}' : booleans cannot cross the shader interface", global.name),
            );
        }

        // Vertex attributes are float-only and never arrays in ESSL 1.00
        let is_attribute = stage == ShaderStage::Vertex && global.storage == GlobalStorage::Input;
        if is_attribute && version == esslt_shared::ShaderVersion::Essl100 {
            if layout.is_array() {
                self.report(
                    DiagnosticId::InvalidQualifierCombination,
                    loc,
                    format!("'{}' : attributes cannot be arrays", global.name),
                );
            }
            if scalar.is_some() && scalar != Some(ScalarType::Float) {
                self.report(
                    DiagnosticId::InvalidQualifierCombination,
                    loc,
                    format!("'{}' : attributes must be float-based", global.name),
                );
            }
        }

        // Integer varyings need flat interpolation from 3.00 on
        let is_varying = !is_attribute;
        if is_varying
            && version >= esslt_shared::ShaderVersion::Essl300
            && matches!(scalar, Some(ScalarType::Int) | Some(ScalarType::UInt))
            && global.interpolation != Some(Interpolation::Flat)
        {
            self.report(
                DiagnosticId::InvalidQualifierCombination,
                loc,
                format!(
                    "'{}' : integer interface variables must be 'flat'",
                    global.name
                ),
            );
        }
    }

    fn check_blocks(&mut self) {
        let module = self.module;
        for block in &module.blocks {
            for field in &block.fields {
                if matches!(element(&field.ty.layout), TypeLayout::Sampler(_)) {
                    self.report(
                        DiagnosticId::OpaqueTypeInStruct,
                        SourceLocation::none(),
                        format!(
                            "'{}' : samplers are not allowed in interface blocks",
                            field.name
                        ),
                    );
                }
            }
        }
    }

    fn check_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            match *statement {
                Statement::Block(ref inner) => self.check_statements(inner),
                Statement::If(_, ref then_block, ref else_block) => {
                    self.check_statements(then_block);
                    if let Some(else_block) = else_block {
                        self.check_statements(else_block);
                    }
                }
                Statement::For(_, _, _, ref body)
                | Statement::While(_, ref body)
                | Statement::DoWhile(ref body, _) => self.check_statements(body),
                Statement::Switch(_, ref cases) => {
                    let mut seen_labels: HashSet<i64> = HashSet::new();
                    let mut seen_default = false;
                    for case in cases {
                        match case.label {
                            CaseLabel::Case(value) => {
                                let loc = self.module.expr(value).loc;
                                match self.module.eval_const_int(value) {
                                    Some(label) => {
                                        if !seen_labels.insert(label) {
                                            self.report(
                                                DiagnosticId::InvalidCaseLabel,
                                                loc,
                                                format!("'{}' : duplicate case label", label),
                                            );
                                        }
                                    }
                                    None => {
                                        self.report(
                                            DiagnosticId::InvalidCaseLabel,
                                            loc,
                                            "case labels must be constant integer expressions",
                                        );
                                    }
                                }
                            }
                            CaseLabel::Default => {
                                if seen_default {
                                    self.report(
                                        DiagnosticId::InvalidCaseLabel,
                                        SourceLocation::none(),
                                        "duplicate default label",
                                    );
                                }
                                seen_default = true;
                            }
                        }
                        self.check_statements(&case.statements);
                    }
                }
                _ => {}
            }
        }
    }

    /// Assignments whose target carries an opaque type are illegal on every
    /// version; the typer only rejects the ones it can see through lvalue
    /// analysis.
    fn check_assignments(&mut self) {
        let module = self.module;
        for id in module.exprs.handles() {
            if let ExprKind::Assign(_, lhs, _) = module.expr(id).kind {
                if contains_opaque(module, &module.expr(lhs).ty.layout) {
                    self.report(
                        DiagnosticId::OpaqueTypeAssignment,
                        module.expr(id).loc,
                        "cannot assign to an opaque type",
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{ShaderStage, ShaderVersion};

    fn check(source: &str, version: ShaderVersion, stage: ShaderStage) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let module = esslt_transform_ast_to_hir::type_check(&unit, version, stage, &mut diagnostics);
        validate(&module, &mut diagnostics);
        diagnostics
    }

    fn check_vs1(source: &str) -> Diagnostics {
        check(source, ShaderVersion::Essl100, ShaderStage::Vertex)
    }

    #[test]
    fn missing_main_reported() {
        let diags = check_vs1("attribute vec4 position;");
        assert!(diags.contains(DiagnosticId::MainMissing));
    }

    #[test]
    fn main_prototype_alone_is_not_enough() {
        let diags = check_vs1("void main();");
        assert!(diags.contains(DiagnosticId::MainMissing));
    }

    #[test]
    fn clean_shader_passes() {
        let diags = check_vs1("attribute vec4 p; void main() { gl_Position = p; }");
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn const_global_requires_initializer() {
        let diags = check_vs1("const float x; void main() {}");
        assert!(diags.contains(DiagnosticId::ConstRequiresInitializer));
    }

    #[test]
    fn global_initializer_must_be_const() {
        let diags = check_vs1(
            "uniform float u; float g = u * 2.0; void main() { gl_Position = vec4(g); }",
        );
        assert!(diags.contains(DiagnosticId::GlobalInitializerNotConst));
    }

    #[test]
    fn constant_global_initializer_accepted() {
        let diags = check_vs1(
            "const float a = 2.0; float g = a * 3.0; void main() { gl_Position = vec4(g); }",
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn uniform_initializer_rejected() {
        let diags = check_vs1("uniform float u = 1.0; void main() {}");
        assert!(diags.contains(DiagnosticId::QualifierNotAllowed));
    }

    #[test]
    fn attribute_initializer_rejected() {
        let diags = check_vs1("attribute vec4 p = vec4(0.0); void main() {}");
        assert!(diags.contains(DiagnosticId::QualifierNotAllowed));
    }

    #[test]
    fn sampler_outside_uniform_rejected() {
        let diags = check(
            "precision mediump float; sampler2D s; void main() {}",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        );
        assert!(diags.contains(DiagnosticId::InvalidQualifierCombination));
    }

    #[test]
    fn sampler_in_struct_gated_by_version() {
        let source = "precision mediump float;\
            struct Holder { sampler2D tex; };\
            uniform Holder h; void main() {}";
        let diags = check(source, ShaderVersion::Essl100, ShaderStage::Fragment);
        assert!(diags.contains(DiagnosticId::OpaqueTypeInStruct));
        let diags = check(source, ShaderVersion::Essl310, ShaderStage::Fragment);
        assert!(!diags.contains(DiagnosticId::OpaqueTypeInStruct));
    }

    #[test]
    fn local_sampler_rejected() {
        let diags = check(
            "precision mediump float; uniform sampler2D s;\
             void main() { sampler2D t; }",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        );
        assert!(diags.contains(DiagnosticId::OpaqueTypeAssignment));
    }

    #[test]
    fn bool_varying_rejected() {
        let diags = check_vs1("varying bool flag; void main() {}");
        assert!(diags.contains(DiagnosticId::InvalidQualifierCombination));
    }

    #[test]
    fn int_attribute_rejected_in_essl1() {
        let diags = check_vs1("attribute ivec2 cell; void main() {}");
        assert!(diags.contains(DiagnosticId::InvalidQualifierCombination));
    }

    #[test]
    fn integer_output_needs_flat() {
        let diags = check(
            "#version 300 es\nout int index; void main() { index = 1; }",
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
        );
        assert!(diags.contains(DiagnosticId::InvalidQualifierCombination));
        let diags = check(
            "#version 300 es\nflat out int index; void main() { index = 1; }",
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn invariant_on_uniform_rejected() {
        let diags = check_vs1("invariant uniform float u; void main() {}");
        assert!(diags.contains(DiagnosticId::InvalidQualifierCombination));
    }

    #[test]
    fn duplicate_case_labels_rejected() {
        let source = "#version 300 es\nvoid main() {\
            int x = 1;\
            switch (x) { case 1: break; case 1: break; }\
        }";
        let diags = check(source, ShaderVersion::Essl300, ShaderStage::Vertex);
        assert!(diags.contains(DiagnosticId::InvalidCaseLabel));
    }

    #[test]
    fn non_constant_case_label_rejected() {
        let source = "#version 300 es\nvoid main() {\
            int x = 1; int y = 2;\
            switch (x) { case y: break; }\
        }";
        let diags = check(source, ShaderVersion::Essl300, ShaderStage::Vertex);
        assert!(diags.contains(DiagnosticId::InvalidCaseLabel));
    }

    #[test]
    fn duplicate_default_rejected() {
        let source = "#version 300 es\nvoid main() {\
            int x = 1;\
            switch (x) { default: break; default: break; }\
        }";
        let diags = check(source, ShaderVersion::Essl300, ShaderStage::Vertex);
        assert!(diags.contains(DiagnosticId::InvalidCaseLabel));
    }
}
