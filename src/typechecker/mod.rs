//! Type checker: computes a resolved type for every expression, checks
//! every statement, and rejects ill-typed programs before any user code
//! runs. Structural throughout, except for class identity which is
//! nominal.

mod assignable;
mod error;
mod scope;
mod types;

pub use assignable::{shape_of, substitute, Relate};
pub use error::TypeError;
pub use scope::TypeScope;
pub use types::*;

use std::collections::HashMap;
use std::rc::Rc;

use crate::lexer::Span;
use crate::parser::ast::*;

/// Result of type checking a node within the AST.
pub type TResult<T> = Result<T, TypeError>;

/// Everything the loader needs from a checked file: the expression type
/// table, the exported value and type bindings, and — for scripts, which
/// share a global scope — every top-level binding.
pub struct CheckOutput {
    pub types: HashMap<NodeId, Type>,
    pub exports: HashMap<String, Type>,
    pub export_types: HashMap<String, Type>,
    pub top_level: HashMap<String, Type>,
    pub top_level_types: HashMap<String, Type>,
}

#[derive(Clone)]
enum ThisCtx {
    Outside,
    Instance(Type),
    Static,
}

pub struct Typechecker {
    scope: TypeScope,
    relate: Relate,
    types: HashMap<NodeId, Type>,
    /// Expected return type of the enclosing function, if annotated.
    return_stack: Vec<Option<Type>>,
    this_stack: Vec<ThisCtx>,
    /// Generic alias definitions: name -> (params, body).
    aliases: HashMap<String, (Vec<TypeParamDecl>, TypeExpr)>,
    /// The class whose constructor is currently being checked, for
    /// readonly-field initialization.
    ctor_of: Option<Rc<ClassType>>,
}

/// Check a whole program. `imports` are the value types a loader resolved
/// from the file's dependencies; `import_types` are imported type
/// definitions.
pub fn check_program(
    program: &Program,
    imports: &HashMap<String, Type>,
    import_types: &HashMap<String, Type>,
) -> Result<CheckOutput, TypeError> {
    let mut checker = Typechecker::new();
    for (name, ty) in imports {
        checker.scope.set_variable(name, ty.clone(), false);
    }
    for (name, ty) in import_types {
        checker.scope.add_type_def(name, ty.clone());
    }

    checker.scope.push();
    checker.hoist_declarations(&program.body)?;
    for stmt in &program.body {
        checker.check_statement(stmt)?;
    }

    let mut exports = HashMap::new();
    let mut export_types = HashMap::new();
    let mut top_level = HashMap::new();
    let mut top_level_types = HashMap::new();
    for stmt in &program.body {
        let exported = matches!(stmt.kind, StmtKind::Export(_));
        let kind = unwrap_export(stmt);
        let mut record = |name: String, ty: Type, is_type: bool| {
            if is_type {
                if exported {
                    export_types.insert(name.clone(), ty.clone());
                }
                top_level_types.insert(name, ty);
            } else {
                if exported {
                    exports.insert(name.clone(), ty.clone());
                }
                top_level.insert(name, ty);
            }
        };
        match kind {
            StmtKind::VarDecl { declarations, .. } => {
                for declarator in declarations {
                    let mut names = vec![];
                    declarator.pattern.bound_names(&mut names);
                    for name in names {
                        if let Some(variable) = checker.scope.find_variable(&name) {
                            record(name, variable.ty, false);
                        }
                    }
                }
            }
            StmtKind::FunctionDecl(func) => {
                let name = func.name.clone().unwrap_or_default();
                if let Some(variable) = checker.scope.find_variable(&name) {
                    record(name, variable.ty, false);
                }
            }
            StmtKind::ClassDecl(decl) => {
                let name = decl.name.clone().unwrap_or_default();
                if let Some(variable) = checker.scope.find_variable(&name) {
                    record(name.clone(), variable.ty, false);
                }
                if let Some(ty) = checker.scope.get_type_def(&name) {
                    record(name, ty, true);
                }
            }
            StmtKind::InterfaceDecl(decl) => {
                if let Some(ty) = checker.scope.get_type_def(&decl.name) {
                    record(decl.name.clone(), ty, true);
                }
            }
            StmtKind::TypeAlias { name, .. } => {
                if let Some(ty) = checker.scope.get_type_def(name) {
                    record(name.clone(), ty, true);
                }
            }
            _ => {}
        }
    }

    Ok(CheckOutput {
        types: checker.types,
        exports,
        export_types,
        top_level,
        top_level_types,
    })
}

impl Typechecker {
    fn new() -> Self {
        let mut scope = TypeScope::new();
        setup_scope(&mut scope);
        Typechecker {
            scope,
            relate: Relate::default(),
            types: HashMap::new(),
            return_stack: vec![],
            this_stack: vec![ThisCtx::Outside],
            aliases: HashMap::new(),
            ctor_of: None,
        }
    }

    fn err(&self, message: impl Into<String>, span: Span) -> TypeError {
        TypeError::new(message, span)
    }

    fn check_assignable(&mut self, from: &Type, to: &Type, span: Span) -> TResult<()> {
        if self.relate.assignable(from, to) {
            Ok(())
        } else {
            Err(TypeError::mismatch(to.clone(), from.clone(), span))
        }
    }

    // -- declaration hoisting ------------------------------------------------

    /// Register class/interface shells, fill their headers, resolve type
    /// aliases, and declare function signatures so forward references and
    /// mutual recursion resolve.
    fn hoist_declarations(&mut self, stmts: &[Statement]) -> TResult<()> {
        let mut class_shells: Vec<(Rc<ClassType>, &ClassDecl)> = vec![];
        let mut interface_shells: Vec<(Rc<InterfaceType>, &InterfaceDecl)> = vec![];

        for stmt in stmts {
            match unwrap_export(stmt) {
                StmtKind::ClassDecl(decl) => {
                    let name = decl.name.as_deref().unwrap_or_default();
                    let shell = ClassType::shell(name);
                    self.scope
                        .add_type_def(name, Type::Class(shell.clone(), vec![]));
                    self.scope
                        .set_variable(name, Type::Ctor(shell.clone()), false);
                    class_shells.push((shell, decl));
                }
                StmtKind::InterfaceDecl(decl) => {
                    let shell = InterfaceType::shell(&decl.name);
                    self.scope
                        .add_type_def(&decl.name, Type::Interface(shell.clone(), vec![]));
                    interface_shells.push((shell, decl));
                }
                _ => {}
            }
        }

        // aliases are registered unresolved so they can reference headers
        // that fill later; resolution happens lazily at use
        for stmt in stmts {
            if let StmtKind::TypeAlias {
                name,
                type_params,
                type_expr,
            } = unwrap_export(stmt)
            {
                let params = self.resolve_type_param_decls(type_params)?;
                for param in &params {
                    self.relate.constraints.remove(&param.name);
                }
                self.aliases
                    .insert(name.clone(), (params, type_expr.clone()));
            }
        }

        for (shell, decl) in &interface_shells {
            self.fill_interface(shell, decl)?;
        }
        for (shell, decl) in &class_shells {
            self.fill_class_header(shell, decl)?;
        }
        for (shell, decl) in &class_shells {
            self.validate_class_obligations(shell, decl)?;
        }

        // materialize non-generic aliases so exports can name them
        for stmt in stmts {
            if let StmtKind::TypeAlias {
                name, type_params, ..
            } = unwrap_export(stmt)
            {
                if type_params.is_empty() {
                    let resolved = self.resolve_named_type(name, &[], stmt.span)?;
                    self.scope.add_type_def(name, resolved);
                }
            }
        }

        // function declarations, including overload signature groups
        let mut index = 0;
        let stmts_kinds: Vec<&StmtKind> = stmts.iter().map(unwrap_export).collect();
        while index < stmts_kinds.len() {
            let StmtKind::FunctionDecl(first) = stmts_kinds[index] else {
                index += 1;
                continue;
            };
            let name = first.name.clone().unwrap_or_default();
            let mut signatures = vec![];
            let mut cursor = index;
            while cursor < stmts_kinds.len() {
                let StmtKind::FunctionDecl(func) = stmts_kinds[cursor] else {
                    break;
                };
                if func.name.as_deref() != Some(name.as_str()) {
                    break;
                }
                if func.is_signature {
                    signatures.push(self.function_signature(func)?);
                    cursor += 1;
                    continue;
                }
                // the implementation closes the group; overload resolution
                // considers the declared signatures only, when present
                if signatures.is_empty() {
                    signatures.push(self.function_signature(func)?);
                }
                cursor += 1;
                break;
            }
            if cursor == index {
                cursor += 1;
            }
            self.scope.set_variable(
                &name,
                Type::Function(Rc::new(FunctionType { signatures })),
                false,
            );
            index = cursor;
        }

        Ok(())
    }

    fn resolve_type_param_decls(&mut self, params: &[TypeParam]) -> TResult<Vec<TypeParamDecl>> {
        let mut decls = vec![];
        for param in params {
            // the parameter may appear inside its own constraint
            self.relate.constraints.insert(param.name.clone(), None);
            let constraint = match &param.constraint {
                Some(constraint) => Some(self.resolve_type(constraint)?),
                None => None,
            };
            self.relate
                .constraints
                .insert(param.name.clone(), constraint.clone());
            decls.push(TypeParamDecl {
                name: param.name.clone(),
                constraint,
            });
        }
        Ok(decls)
    }

    fn function_signature(&mut self, func: &FunctionLit) -> TResult<Signature> {
        let saved_constraints = self.relate.constraints.clone();
        let type_params = self.resolve_type_param_decls(&func.type_params)?;
        let params = self.param_types(&func.params)?;
        let ret = match &func.return_type {
            Some(annotation) => self.resolve_type(annotation)?,
            None => Type::Any,
        };
        self.relate.constraints = saved_constraints;
        Ok(Signature {
            type_params,
            params,
            ret,
        })
    }

    fn param_types(&mut self, params: &[Param]) -> TResult<Vec<ParamType>> {
        let mut out = vec![];
        for param in params {
            let ty = match &param.type_expr {
                Some(annotation) => self.resolve_type(annotation)?,
                None => Type::Any,
            };
            let name = match &param.pattern {
                Pattern::Ident { name, .. } => name.clone(),
                _ => String::new(),
            };
            out.push(ParamType {
                name,
                ty,
                optional: param.optional || param.default.is_some(),
                rest: param.rest,
            });
        }
        Ok(out)
    }

    fn fill_interface(&mut self, shell: &Rc<InterfaceType>, decl: &InterfaceDecl) -> TResult<()> {
        let saved_constraints = self.relate.constraints.clone();
        let params = self.resolve_type_param_decls(&decl.type_params)?;
        *shell.type_params.borrow_mut() = params;

        for base in &decl.extends {
            let resolved = self.resolve_type(base)?;
            match resolved {
                Type::Interface(base, _) => shell.extends.borrow_mut().push(base),
                other => {
                    return Err(self.err(
                        format!("an interface can only extend interfaces, not '{other}'"),
                        base.span,
                    ))
                }
            }
        }

        for member in &decl.members {
            match member {
                InterfaceMember::Property {
                    name,
                    type_expr,
                    optional,
                } => {
                    let ty = self.resolve_type(type_expr)?;
                    shell.members.borrow_mut().push(PropType {
                        name: name.clone(),
                        ty,
                        optional: *optional,
                        readonly: false,
                    });
                }
                InterfaceMember::Method {
                    name,
                    type_params,
                    params,
                    return_type,
                    optional,
                } => {
                    let saved = self.relate.constraints.clone();
                    let type_params = self.resolve_type_param_decls(type_params)?;
                    let params = self.param_types(params)?;
                    let ret = match return_type {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    self.relate.constraints = saved;
                    shell.members.borrow_mut().push(PropType {
                        name: name.clone(),
                        ty: Type::Function(FunctionType::single(Signature {
                            type_params,
                            params,
                            ret,
                        })),
                        optional: *optional,
                        readonly: false,
                    });
                }
                InterfaceMember::Index {
                    key_type,
                    value_type,
                    ..
                } => {
                    let value = self.resolve_type(value_type)?;
                    match key_type {
                        IndexKeyType::String => *shell.string_index.borrow_mut() = Some(value),
                        IndexKeyType::Number => *shell.number_index.borrow_mut() = Some(value),
                        IndexKeyType::Symbol => {}
                    }
                }
            }
        }
        self.relate.constraints = saved_constraints;
        Ok(())
    }

    fn fill_class_header(&mut self, shell: &Rc<ClassType>, decl: &ClassDecl) -> TResult<()> {
        let saved_constraints = self.relate.constraints.clone();
        let params = self.resolve_type_param_decls(&decl.type_params)?;
        *shell.type_params.borrow_mut() = params;
        *shell.is_abstract.borrow_mut() = decl.is_abstract;

        if let Some(superclass) = &decl.superclass {
            let parent = self.check_expression(superclass)?;
            match parent {
                Type::Ctor(parent) => *shell.parent.borrow_mut() = Some(parent),
                Type::Any => {}
                other => {
                    return Err(self.err(
                        format!("class can only extend another class, not '{other}'"),
                        superclass.span,
                    ))
                }
            }
        }

        for implemented in &decl.implements {
            let resolved = self.resolve_type(implemented)?;
            match resolved {
                Type::Interface(interface, _) => {
                    shell.interfaces.borrow_mut().push(interface);
                }
                other => {
                    return Err(self.err(
                        format!("a class can only implement interfaces, not '{other}'"),
                        implemented.span,
                    ))
                }
            }
        }

        for member in &decl.members {
            let member_type = match &member.kind {
                ClassMemberKind::Field { type_expr, .. } => {
                    let ty = match type_expr {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    Some((ty, MemberKind::Field))
                }
                ClassMemberKind::Method(func) => {
                    let signature = self.function_signature(func)?;
                    Some((
                        Type::Function(FunctionType::single(signature)),
                        MemberKind::Method,
                    ))
                }
                ClassMemberKind::AbstractMethod {
                    type_params,
                    params,
                    return_type,
                } => {
                    let saved = self.relate.constraints.clone();
                    let type_params = self.resolve_type_param_decls(type_params)?;
                    let params = self.param_types(params)?;
                    let ret = match return_type {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    self.relate.constraints = saved;
                    Some((
                        Type::Function(FunctionType::single(Signature {
                            type_params,
                            params,
                            ret,
                        })),
                        MemberKind::Method,
                    ))
                }
                ClassMemberKind::Getter(func) => {
                    let ret = match &func.return_type {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    Some((ret, MemberKind::Getter))
                }
                ClassMemberKind::Setter(func) => {
                    let ty = match func.params.first().and_then(|p| p.type_expr.as_ref()) {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    Some((ty, MemberKind::Setter))
                }
                ClassMemberKind::StaticBlock(_) => None,
            };
            if let Some((ty, kind)) = member_type {
                shell.members.borrow_mut().push(ClassMemberType {
                    name: member.name.clone(),
                    ty,
                    kind,
                    is_static: member.is_static,
                    is_abstract: member.is_abstract,
                    readonly: member.is_readonly,
                    access: member.access,
                });
            }
        }
        self.relate.constraints = saved_constraints;
        Ok(())
    }

    /// Abstract obligations, `override` validity and `implements`
    /// conformance, once the full header is known.
    fn validate_class_obligations(
        &mut self,
        shell: &Rc<ClassType>,
        decl: &ClassDecl,
    ) -> TResult<()> {
        if !decl.is_abstract {
            for obligation in shell.abstract_obligations() {
                let implemented = shell
                    .members
                    .borrow()
                    .iter()
                    .any(|m| m.name == obligation && !m.is_abstract);
                if !implemented {
                    return Err(self.err(
                        format!(
                            "non-abstract class '{}' does not implement inherited abstract member '{obligation}'",
                            shell.name
                        ),
                        decl.span,
                    ));
                }
            }
        }

        for member in &decl.members {
            if member.is_override {
                let parent = shell.parent.borrow().clone();
                let found = parent
                    .as_ref()
                    .and_then(|p| p.member(&member.name, member.is_static));
                if found.is_none() {
                    return Err(self.err(
                        format!(
                            "member '{}' is marked 'override' but no base class declares it",
                            member.name
                        ),
                        member.span,
                    ));
                }
            }
        }

        let interfaces = shell.interfaces.borrow().clone();
        for interface in interfaces {
            for required in interface.all_members() {
                let Some(member) = shell.member(&required.name, false) else {
                    if required.optional {
                        continue;
                    }
                    return Err(self.err(
                        format!(
                            "class '{}' incorrectly implements interface '{}': property '{}' is missing",
                            shell.name, interface.name, required.name
                        ),
                        decl.span,
                    ));
                };
                if !self.relate.assignable(&member.ty, &required.ty) {
                    return Err(self.err(
                        format!(
                            "class '{}' incorrectly implements interface '{}': '{}' has type '{}' which is not assignable to '{}'",
                            shell.name, interface.name, required.name, member.ty, required.ty
                        ),
                        decl.span,
                    ));
                }
            }
        }

        Ok(())
    }

    // -- type annotation resolution ------------------------------------------

    fn resolve_type(&mut self, annotation: &TypeExpr) -> TResult<Type> {
        let span = annotation.span;
        match &annotation.kind {
            TypeExprKind::Named { name, args } => self.resolve_named_type(name, args, span),
            TypeExprKind::StringLit(value) => Ok(Type::StringLit(value.clone())),
            TypeExprKind::NumberLit(value) => Ok(Type::NumberLit(*value)),
            TypeExprKind::BoolLit(value) => Ok(Type::BoolLit(*value)),
            TypeExprKind::Array(element) => {
                Ok(Type::Array(Box::new(self.resolve_type(element)?)))
            }
            TypeExprKind::Tuple(elements) => {
                let mut resolved = vec![];
                for element in elements {
                    resolved.push(self.resolve_type(element)?);
                }
                Ok(Type::Tuple(resolved))
            }
            TypeExprKind::Union(arms) => {
                let mut resolved = vec![];
                for arm in arms {
                    resolved.push(self.resolve_type(arm)?);
                }
                Ok(Type::union_of(resolved))
            }
            TypeExprKind::Intersection(arms) => {
                let mut resolved = vec![];
                for arm in arms {
                    resolved.push(self.resolve_type(arm)?);
                }
                Ok(Type::Intersection(resolved))
            }
            TypeExprKind::Object(members) => {
                let mut object = ObjectType::default();
                for member in members {
                    match member {
                        ObjectTypeMember::Property {
                            name,
                            type_expr,
                            optional,
                        } => {
                            let ty = self.resolve_type(type_expr)?;
                            object.props.push(PropType {
                                name: name.clone(),
                                ty,
                                optional: *optional,
                                readonly: false,
                            });
                        }
                        ObjectTypeMember::Index {
                            key_type,
                            value_type,
                            ..
                        } => {
                            let value = self.resolve_type(value_type)?;
                            match key_type {
                                IndexKeyType::String => object.string_index = Some(value),
                                IndexKeyType::Number => object.number_index = Some(value),
                                IndexKeyType::Symbol => object.symbol_index = Some(value),
                            }
                        }
                    }
                }
                Ok(Type::Object(Rc::new(object)))
            }
            TypeExprKind::Function {
                type_params,
                params,
                return_type,
            } => {
                let saved = self.relate.constraints.clone();
                let type_params = self.resolve_type_param_decls(type_params)?;
                let params = self.param_types(params)?;
                let ret = self.resolve_type(return_type)?;
                self.relate.constraints = saved;
                Ok(Type::Function(FunctionType::single(Signature {
                    type_params,
                    params,
                    ret,
                })))
            }
            TypeExprKind::KeyOf(operand) => {
                let operand = self.resolve_type(operand)?;
                Ok(self.resolve_keyof(&operand))
            }
            TypeExprKind::IndexAccess(target, index) => {
                let target = self.resolve_type(target)?;
                let index = self.resolve_type(index)?;
                self.resolve_index_access(&target, &index, span)
            }
        }
    }

    fn resolve_named_type(&mut self, name: &str, args: &[TypeExpr], span: Span) -> TResult<Type> {
        let mut resolved_args = vec![];
        for arg in args {
            resolved_args.push(self.resolve_type(arg)?);
        }

        match name {
            "number" => return Ok(Type::Number),
            "string" => return Ok(Type::String),
            "boolean" => return Ok(Type::Boolean),
            "symbol" => return Ok(Type::Symbol),
            "null" => return Ok(Type::Null),
            "undefined" => return Ok(Type::Undefined),
            "void" => return Ok(Type::Void),
            "any" | "unknown" | "object" | "Function" | "Promise" => return Ok(Type::Any),
            "never" => return Ok(Type::Never),
            "Array" => {
                let element = resolved_args.into_iter().next().unwrap_or(Type::Any);
                return Ok(Type::Array(Box::new(element)));
            }
            _ => {}
        }

        if self.relate.constraints.contains_key(name) {
            return Ok(Type::TypeParam(name.to_string()));
        }

        if let Some((params, body)) = self.aliases.get(name).cloned() {
            let args_filled: Vec<Type> = (0..params.len())
                .map(|i| resolved_args.get(i).cloned().unwrap_or(Type::Any))
                .collect();
            self.check_type_args(&params, &args_filled, span)?;
            let saved = self.relate.constraints.clone();
            for param in &params {
                self.relate
                    .constraints
                    .insert(param.name.clone(), param.constraint.clone());
            }
            let resolved = self.resolve_type(&body)?;
            self.relate.constraints = saved;
            let map: HashMap<String, Type> = params
                .iter()
                .map(|p| p.name.clone())
                .zip(args_filled)
                .collect();
            return Ok(substitute(&resolved, &map));
        }

        match self.scope.get_type_def(name) {
            Some(Type::Class(class, _)) => {
                let params = class.type_params.borrow().clone();
                let args_filled: Vec<Type> = (0..params.len())
                    .map(|i| resolved_args.get(i).cloned().unwrap_or(Type::Any))
                    .collect();
                self.check_type_args(&params, &args_filled, span)?;
                Ok(Type::Class(class, args_filled))
            }
            Some(Type::Interface(interface, _)) => {
                let params = interface.type_params.borrow().clone();
                let args_filled: Vec<Type> = (0..params.len())
                    .map(|i| resolved_args.get(i).cloned().unwrap_or(Type::Any))
                    .collect();
                self.check_type_args(&params, &args_filled, span)?;
                Ok(Type::Interface(interface, args_filled))
            }
            Some(other) => Ok(other),
            None => Err(self.err(format!("cannot find type '{name}'"), span)),
        }
    }

    /// Check explicit or defaulted type arguments against their declared
    /// constraints.
    fn check_type_args(
        &mut self,
        params: &[TypeParamDecl],
        args: &[Type],
        span: Span,
    ) -> TResult<()> {
        for (param, arg) in params.iter().zip(args) {
            if let Some(constraint) = &param.constraint {
                if !self.relate.assignable(arg, constraint) {
                    return Err(self.err(
                        format!(
                            "type '{arg}' does not satisfy the constraint '{constraint}' of type parameter '{}'",
                            param.name
                        ),
                        span,
                    ));
                }
            }
        }
        Ok(())
    }

    /// `keyof T`: the union of string-literal types of `T`'s known property
    /// names plus its index-signature domains.
    fn resolve_keyof(&mut self, operand: &Type) -> Type {
        if matches!(operand, Type::TypeParam(_)) {
            return Type::KeyOf(Box::new(operand.clone()));
        }
        let Some(shape) = shape_of(operand) else {
            return Type::union_of(vec![Type::String, Type::Number, Type::Symbol]);
        };
        let mut arms: Vec<Type> = shape
            .props
            .iter()
            .map(|p| Type::StringLit(p.name.clone()))
            .collect();
        if shape.string_index.is_some() {
            arms.push(Type::String);
        }
        if shape.number_index.is_some() {
            arms.push(Type::Number);
        }
        if arms.is_empty() {
            Type::Never
        } else {
            Type::union_of(arms)
        }
    }

    /// `T[K]`: the property type for literal keys, or the union across the
    /// matched index signature.
    fn resolve_index_access(&mut self, target: &Type, index: &Type, span: Span) -> TResult<Type> {
        if matches!(target, Type::TypeParam(_)) || matches!(index, Type::TypeParam(_)) {
            return Ok(Type::IndexAccess(
                Box::new(target.clone()),
                Box::new(index.clone()),
            ));
        }
        if let Type::Union(arms) = index {
            let mut resolved = vec![];
            for arm in arms {
                resolved.push(self.resolve_index_access(target, arm, span)?);
            }
            return Ok(Type::union_of(resolved));
        }
        if let Type::Array(element) = target {
            return Ok(*element.clone());
        }
        if let Type::Tuple(elements) = target {
            return Ok(match index {
                Type::NumberLit(n) => elements
                    .get(*n as usize)
                    .cloned()
                    .unwrap_or(Type::Undefined),
                _ => Type::union_of(elements.clone()),
            });
        }
        let Some(shape) = shape_of(target) else {
            return Ok(Type::Any);
        };
        match index {
            Type::StringLit(name) => match shape.props.iter().find(|p| p.name == *name) {
                Some(prop) => Ok(prop.ty.clone()),
                None => match &shape.string_index {
                    Some(ty) => Ok(ty.clone()),
                    None => Err(self.err(
                        format!("property '{name}' does not exist on type '{target}'"),
                        span,
                    )),
                },
            },
            Type::String => match &shape.string_index {
                Some(ty) => Ok(ty.clone()),
                None => Ok(Type::union_of(
                    shape.props.iter().map(|p| p.ty.clone()).collect(),
                )),
            },
            Type::Number | Type::NumberLit(_) => match &shape.number_index {
                Some(ty) => Ok(ty.clone()),
                None => match &shape.string_index {
                    Some(ty) => Ok(ty.clone()),
                    None => Ok(Type::Any),
                },
            },
            _ => Ok(Type::Any),
        }
    }

    // -- statements ----------------------------------------------------------

    fn check_statement(&mut self, stmt: &Statement) -> TResult<()> {
        match &stmt.kind {
            StmtKind::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    self.check_declarator(declarator, *kind)?;
                }
                Ok(())
            }
            StmtKind::FunctionDecl(func) => {
                if func.is_signature {
                    return Ok(());
                }
                self.check_function_body(func, ThisCtx::Outside)
            }
            StmtKind::ClassDecl(decl) => self.check_class_bodies(decl),
            StmtKind::InterfaceDecl(_) | StmtKind::TypeAlias { .. } | StmtKind::Empty => Ok(()),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.check_expression(cond)?;
                self.check_statement(then)?;
                if let Some(otherwise) = otherwise {
                    self.check_statement(otherwise)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.check_expression(cond)?;
                self.check_statement(body)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.scope.push();
                if let Some(init) = init {
                    self.check_statement(init)?;
                }
                if let Some(test) = test {
                    self.check_expression(test)?;
                }
                if let Some(update) = update {
                    self.check_expression(update)?;
                }
                self.check_statement(body)?;
                self.scope.pop();
                Ok(())
            }
            StmtKind::ForOf {
                pattern, iterable, body, ..
            } => {
                let iterable_ty = self.check_expression(iterable)?;
                let element = self.element_type(&iterable_ty, iterable.span)?;
                self.scope.push();
                self.bind_pattern_types(pattern, &element, true)?;
                self.check_statement(body)?;
                self.scope.pop();
                Ok(())
            }
            StmtKind::ForIn {
                name, object, body, ..
            } => {
                self.check_expression(object)?;
                self.scope.push();
                self.scope.set_variable(name, Type::String, true);
                self.check_statement(body)?;
                self.scope.pop();
                Ok(())
            }
            StmtKind::Return(argument) => {
                let actual = match argument {
                    Some(argument) => self.check_expression(argument)?,
                    None => Type::Undefined,
                };
                let expected = self.return_stack.last().cloned().flatten();
                if let Some(expected) = expected {
                    if !matches!(expected, Type::Any | Type::Void) {
                        let span = argument.as_ref().map(|a| a.span).unwrap_or(stmt.span);
                        self.check_assignable(&actual, &expected, span)?;
                    }
                }
                Ok(())
            }
            StmtKind::Throw(argument) => {
                self.check_expression(argument)?;
                Ok(())
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                self.scope.push();
                for stmt in block {
                    self.check_statement(stmt)?;
                }
                self.scope.pop();
                if let Some(catch) = catch {
                    self.scope.push();
                    if let Some(param) = &catch.param {
                        self.bind_pattern_types(param, &Type::Any, true)?;
                    }
                    for stmt in &catch.body {
                        self.check_statement(stmt)?;
                    }
                    self.scope.pop();
                }
                if let Some(finally) = finally {
                    self.scope.push();
                    for stmt in finally {
                        self.check_statement(stmt)?;
                    }
                    self.scope.pop();
                }
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                self.check_expression(discriminant)?;
                self.scope.push();
                for case in cases {
                    if let Some(test) = &case.test {
                        self.check_expression(test)?;
                    }
                    for stmt in &case.body {
                        self.check_statement(stmt)?;
                    }
                }
                self.scope.pop();
                Ok(())
            }
            StmtKind::Block(stmts) => {
                self.scope.push();
                self.hoist_declarations(stmts)?;
                for stmt in stmts {
                    self.check_statement(stmt)?;
                }
                self.scope.pop();
                Ok(())
            }
            StmtKind::Expression(expr) => {
                self.check_expression(expr)?;
                Ok(())
            }
            StmtKind::Import { .. } => Ok(()), // bindings were installed up front
            StmtKind::Export(inner) => self.check_statement(inner),
        }
    }

    fn check_declarator(&mut self, declarator: &Declarator, kind: DeclKind) -> TResult<()> {
        let declared = match &declarator.type_expr {
            Some(annotation) => Some(self.resolve_type(annotation)?),
            None => None,
        };
        let init_ty = match &declarator.init {
            Some(init) => Some(self.check_expression(init)?),
            None => None,
        };

        let ty = match (&declared, &init_ty) {
            (Some(declared), Some(actual)) => {
                // an array literal is contextually typed by a declared tuple
                let contextual_tuple = match (&declared, declarator.init.as_ref()) {
                    (Type::Tuple(expected), Some(init)) => {
                        if let ExprKind::ArrayLit(items) = &init.kind {
                            if items.len() != expected.len() {
                                return Err(TypeError::mismatch(
                                    declared.clone(),
                                    actual.clone(),
                                    declarator.span,
                                ));
                            }
                            for (item, expected_el) in items.iter().zip(expected) {
                                if let ArrayItem::Item { expr, .. } = item {
                                    let item_ty = self
                                        .types
                                        .get(&expr.id)
                                        .cloned()
                                        .unwrap_or(Type::Any);
                                    self.check_assignable(&item_ty, expected_el, expr.span)?;
                                }
                            }
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                };
                if !contextual_tuple {
                    self.check_assignable(actual, declared, declarator.span)?;
                    if let Some(init) = &declarator.init {
                        self.check_excess_properties(init, declared)?;
                    }
                }
                declared.clone()
            }
            (Some(declared), None) => declared.clone(),
            (None, Some(actual)) => actual.widened(),
            (None, None) => Type::Any,
        };

        self.bind_pattern_types(&declarator.pattern, &ty, kind != DeclKind::Const)?;
        Ok(())
    }

    /// Excess properties in an object-literal initializer for a declared
    /// interface or object type are an error.
    fn check_excess_properties(&mut self, init: &Expression, declared: &Type) -> TResult<()> {
        let ExprKind::ObjectLit(props) = &init.kind else {
            return Ok(());
        };
        let Some(shape) = shape_of(declared) else {
            return Ok(());
        };
        if shape.string_index.is_some() || shape.number_index.is_some() {
            return Ok(());
        }
        for prop in props {
            let name = match prop {
                ObjectProp::KeyValue { key: PropKey::Ident(name) | PropKey::Str(name), .. } => name,
                ObjectProp::Shorthand(name) => name,
                _ => continue,
            };
            if !shape.props.iter().any(|p| p.name == *name) {
                return Err(self.err(
                    format!(
                        "object literal may only specify known properties, and '{name}' does not exist in type '{declared}'"
                    ),
                    init.span,
                ));
            }
        }
        Ok(())
    }

    fn bind_pattern_types(&mut self, pattern: &Pattern, ty: &Type, mutable: bool) -> TResult<()> {
        match pattern {
            Pattern::Ident { name, .. } => {
                self.scope.set_variable(name, ty.clone(), mutable);
                Ok(())
            }
            Pattern::Array { elements, .. } => {
                for (index, element) in elements.iter().enumerate() {
                    let Some(element) = element else {
                        continue;
                    };
                    let element_ty = if element.rest {
                        match ty {
                            Type::Array(_) => ty.clone(),
                            Type::Tuple(els) => {
                                Type::Array(Box::new(Type::union_of(
                                    els.get(index..).unwrap_or(&[]).to_vec(),
                                )))
                            }
                            _ => Type::Any,
                        }
                    } else {
                        match ty {
                            Type::Array(el) => (**el).clone(),
                            Type::Tuple(els) => {
                                els.get(index).cloned().unwrap_or(Type::Undefined)
                            }
                            _ => Type::Any,
                        }
                    };
                    if let Some(default) = &element.default {
                        self.check_expression(default)?;
                    }
                    self.bind_pattern_types(&element.pattern, &element_ty, mutable)?;
                }
                Ok(())
            }
            Pattern::Object { props, rest, .. } => {
                let shape = shape_of(ty);
                for prop in props {
                    let prop_ty = shape
                        .as_ref()
                        .and_then(|s| s.props.iter().find(|p| p.name == prop.key))
                        .map(|p| p.ty.clone())
                        .unwrap_or(Type::Any);
                    if let Some(default) = &prop.default {
                        self.check_expression(default)?;
                    }
                    self.bind_pattern_types(&prop.value, &prop_ty, mutable)?;
                }
                if let Some(rest) = rest {
                    self.scope.set_variable(rest, Type::Any, mutable);
                }
                Ok(())
            }
        }
    }

    fn check_function_body(&mut self, func: &FunctionLit, this: ThisCtx) -> TResult<()> {
        let saved_constraints = self.relate.constraints.clone();
        let type_params = self.resolve_type_param_decls(&func.type_params)?;
        for param in &type_params {
            self.relate
                .constraints
                .insert(param.name.clone(), param.constraint.clone());
        }

        let ret = match &func.return_type {
            Some(annotation) => Some(self.resolve_type(annotation)?),
            None => None,
        };

        self.scope.push();
        for param in &func.params {
            let ty = match &param.type_expr {
                Some(annotation) => self.resolve_type(annotation)?,
                None => Type::Any,
            };
            if let Some(default) = &param.default {
                let default_ty = self.check_expression(default)?;
                if !matches!(ty, Type::Any) {
                    self.check_assignable(&default_ty, &ty, default.span)?;
                }
            }
            let ty = if param.rest {
                match ty {
                    array @ Type::Array(_) => array,
                    other => Type::Array(Box::new(other)),
                }
            } else {
                ty
            };
            self.bind_pattern_types(&param.pattern, &ty, true)?;
        }

        // generators and async bodies produce wrapped values; checking
        // their annotated payload type stays out of scope here
        let effective_ret = if func.is_generator || func.is_async {
            None
        } else {
            ret
        };
        self.return_stack.push(effective_ret);
        let pushed_this = if func.is_arrow {
            false
        } else {
            self.this_stack.push(this);
            true
        };

        let result = (|| {
            match &func.body {
                FunctionBody::Block(stmts) => {
                    self.hoist_declarations(stmts)?;
                    for stmt in stmts {
                        self.check_statement(stmt)?;
                    }
                }
                FunctionBody::Expr(expr) => {
                    let actual = self.check_expression(expr)?;
                    if let Some(Some(expected)) = self.return_stack.last().cloned() {
                        if !matches!(expected, Type::Any | Type::Void) {
                            self.check_assignable(&actual, &expected, expr.span)?;
                        }
                    }
                }
            }
            Ok(())
        })();

        self.return_stack.pop();
        if pushed_this {
            self.this_stack.pop();
        }
        self.scope.pop();
        self.relate.constraints = saved_constraints;
        result
    }

    fn check_class_bodies(&mut self, decl: &ClassDecl) -> TResult<()> {
        let name = decl.name.as_deref().unwrap_or_default();
        let Some(Type::Class(class, _)) = self.scope.get_type_def(name) else {
            return Ok(());
        };
        let saved_constraints = self.relate.constraints.clone();
        let own_params = class.type_params.borrow().clone();
        for param in &own_params {
            self.relate
                .constraints
                .insert(param.name.clone(), param.constraint.clone());
        }
        let instance = Type::Class(
            class.clone(),
            own_params
                .iter()
                .map(|p| Type::TypeParam(p.name.clone()))
                .collect(),
        );

        for member in &decl.members {
            match &member.kind {
                ClassMemberKind::Field { init, .. } => {
                    if let Some(init) = init {
                        let this = if member.is_static {
                            ThisCtx::Static
                        } else {
                            ThisCtx::Instance(instance.clone())
                        };
                        self.this_stack.push(this);
                        let actual = self.check_expression(init);
                        self.this_stack.pop();
                        let actual = actual?;
                        if let Some(declared) = class
                            .member(&member.name, member.is_static)
                            .map(|m| m.ty)
                        {
                            if !matches!(declared, Type::Any) {
                                self.check_assignable(&actual, &declared, member.span)?;
                            }
                        }
                    }
                }
                ClassMemberKind::Method(func)
                | ClassMemberKind::Getter(func)
                | ClassMemberKind::Setter(func) => {
                    let this = if member.is_static {
                        ThisCtx::Static
                    } else {
                        ThisCtx::Instance(instance.clone())
                    };
                    let is_ctor = member.name == "constructor";
                    if is_ctor {
                        self.ctor_of = Some(class.clone());
                    }
                    let result = self.check_function_body(func, this);
                    if is_ctor {
                        self.ctor_of = None;
                    }
                    result?;
                }
                ClassMemberKind::StaticBlock(body) => {
                    self.this_stack.push(ThisCtx::Static);
                    self.scope.push();
                    let mut result = Ok(());
                    for stmt in body {
                        result = self.check_statement(stmt);
                        if result.is_err() {
                            break;
                        }
                    }
                    self.scope.pop();
                    self.this_stack.pop();
                    result?;
                }
                ClassMemberKind::AbstractMethod { .. } => {}
            }
        }
        self.relate.constraints = saved_constraints;
        Ok(())
    }

    /// The element type produced by iterating a value.
    fn element_type(&mut self, iterable: &Type, span: Span) -> TResult<Type> {
        match iterable {
            Type::Array(element) => Ok((**element).clone()),
            Type::Tuple(elements) => Ok(Type::union_of(elements.clone())),
            Type::String | Type::StringLit(_) => Ok(Type::String),
            Type::Any => Ok(Type::Any),
            Type::Union(arms) => {
                let mut elements = vec![];
                for arm in arms {
                    elements.push(self.element_type(arm, span)?);
                }
                Ok(Type::union_of(elements))
            }
            // Map/Set/generator instances and interface iterables surface
            // as any from the builtin environment
            Type::Class(..) | Type::Interface(..) | Type::Object(_) => Ok(Type::Any),
            other => Err(self.err(format!("type '{other}' is not iterable"), span)),
        }
    }

    // -- expressions ---------------------------------------------------------

    /// Check an expression and record its resolved type. Every expression
    /// node ends up with exactly one entry in the type table.
    fn check_expression(&mut self, expr: &Expression) -> TResult<Type> {
        let ty = self.expression_type(expr)?;
        self.types.insert(expr.id, ty.clone());
        Ok(ty)
    }

    fn expression_type(&mut self, expr: &Expression) -> TResult<Type> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Type::NumberLit(*n)),
            ExprKind::Str(s) => Ok(Type::StringLit(s.clone())),
            ExprKind::Bool(b) => Ok(Type::BoolLit(*b)),
            ExprKind::Null => Ok(Type::Null),
            ExprKind::Undefined => Ok(Type::Undefined),
            ExprKind::Regex { .. } => Ok(Type::Any),
            ExprKind::Template { exprs, .. } => {
                for part in exprs {
                    self.check_expression(part)?;
                }
                Ok(Type::String)
            }
            ExprKind::Ident(name) => match self.scope.find_variable(name) {
                Some(variable) => Ok(variable.ty),
                None => Err(self.err(format!("cannot find name '{name}'"), span)),
            },
            ExprKind::This => match self.this_stack.last().cloned() {
                Some(ThisCtx::Instance(instance)) => Ok(instance),
                Some(ThisCtx::Static) => Ok(Type::Any),
                _ => Err(self.err(
                    "'this' is only legal inside instance methods and constructors",
                    span,
                )),
            },
            ExprKind::Super => {
                Err(self.err("'super' must be called or member-accessed", span))
            }
            ExprKind::Grouping(inner) => self.check_expression(inner),
            ExprKind::Unary { op, operand } => {
                // `typeof` may probe names that are not declared
                if *op == UnaryOp::Typeof {
                    if let ExprKind::Ident(name) = &operand.kind {
                        if self.scope.find_variable(name).is_none() {
                            self.types.insert(operand.id, Type::Undefined);
                            return Ok(Type::String);
                        }
                    }
                }
                let operand_ty = self.check_expression(operand)?;
                match op {
                    UnaryOp::Not => Ok(Type::Boolean),
                    UnaryOp::Typeof => Ok(Type::String),
                    UnaryOp::Void => Ok(Type::Undefined),
                    UnaryOp::Delete => Ok(Type::Boolean),
                    UnaryOp::Minus | UnaryOp::Plus => {
                        if !self.relate.assignable(&operand_ty, &Type::Number)
                            && !matches!(operand_ty, Type::Any)
                            && *op == UnaryOp::Minus
                        {
                            return Err(self.err(
                                format!("unary '-' cannot be applied to type '{operand_ty}'"),
                                span,
                            ));
                        }
                        Ok(Type::Number)
                    }
                }
            }
            ExprKind::Update { target, .. } => {
                let target_ty = self.check_expression(target)?;
                if !self.relate.assignable(&target_ty, &Type::Number) {
                    return Err(self.err(
                        format!(
                            "increment/decrement target must be a number, found '{target_ty}'"
                        ),
                        span,
                    ));
                }
                Ok(Type::Number)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.check_expression(lhs)?;
                let rhs_ty = self.check_expression(rhs)?;
                self.binary_type(*op, &lhs_ty, &rhs_ty, span)
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let lhs_ty = self.check_expression(lhs)?;
                let rhs_ty = self.check_expression(rhs)?;
                let _ = op;
                Ok(Type::union_of(vec![lhs_ty.widened(), rhs_ty.widened()]))
            }
            ExprKind::Assign { op, target, value } => {
                self.check_assignment(*op, target, value, span)
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.check_expression(cond)?;
                let then_ty = self.check_expression(then)?;
                let otherwise_ty = self.check_expression(otherwise)?;
                Ok(Type::union_of(vec![
                    then_ty.widened(),
                    otherwise_ty.widened(),
                ]))
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, span),
            ExprKind::New {
                callee,
                type_args,
                args,
            } => self.check_new(callee, type_args, args, span),
            ExprKind::Member { object, property } => {
                self.check_member(object, property, span)
            }
            ExprKind::ArrayLit(items) => {
                let mut element_types = vec![];
                for item in items {
                    match item {
                        ArrayItem::Hole => element_types.push(Type::Undefined),
                        ArrayItem::Item { spread, expr } => {
                            let item_ty = self.check_expression(expr)?;
                            if *spread {
                                element_types.push(self.element_type(&item_ty, expr.span)?);
                            } else {
                                element_types.push(item_ty.widened());
                            }
                        }
                    }
                }
                Ok(Type::Array(Box::new(Type::union_of(element_types))))
            }
            ExprKind::ObjectLit(props) => self.check_object_literal(props),
            ExprKind::Function(func) | ExprKind::Arrow(func) => {
                let signature = self.function_signature(func)?;
                // arrows ignore the pushed context and inherit `this`
                self.check_function_body(func, ThisCtx::Outside)?;
                Ok(Type::Function(FunctionType::single(signature)))
            }
            ExprKind::ClassExpr(decl) => {
                let name = decl.name.as_deref().unwrap_or("");
                let shell = ClassType::shell(name);
                self.scope.push();
                if !name.is_empty() {
                    self.scope
                        .add_type_def(name, Type::Class(shell.clone(), vec![]));
                    self.scope.set_variable(name, Type::Ctor(shell.clone()), false);
                }
                self.fill_class_header(&shell, decl)?;
                self.validate_class_obligations(&shell, decl)?;
                self.check_class_bodies(decl)?;
                self.scope.pop();
                Ok(Type::Ctor(shell))
            }
            ExprKind::TypeAssertion { expr, type_expr } => {
                self.check_expression(expr)?;
                self.resolve_type(type_expr)
            }
            ExprKind::NonNull(inner) => {
                let inner_ty = self.check_expression(inner)?;
                Ok(match inner_ty {
                    Type::Union(arms) => Type::union_of(
                        arms.into_iter().filter(|arm| !arm.is_nullish()).collect(),
                    ),
                    Type::Null | Type::Undefined => Type::Never,
                    other => other,
                })
            }
            ExprKind::Yield { argument, .. } => {
                if let Some(argument) = argument {
                    self.check_expression(argument)?;
                }
                Ok(Type::Any)
            }
            ExprKind::Await(argument) => self.check_expression(argument),
        }
    }

    fn binary_type(&mut self, op: BinaryOp, lhs: &Type, rhs: &Type, span: Span) -> TResult<Type> {
        let numeric = |relate: &mut Relate, ty: &Type| {
            matches!(ty, Type::Any) || relate.assignable(ty, &Type::Number)
        };
        let stringy = |relate: &mut Relate, ty: &Type| relate.assignable(ty, &Type::String);

        match op {
            BinaryOp::Add => {
                if stringy(&mut self.relate, lhs) || stringy(&mut self.relate, rhs) {
                    return Ok(Type::String);
                }
                if matches!(lhs, Type::Any) || matches!(rhs, Type::Any) {
                    return Ok(Type::Any);
                }
                if numeric(&mut self.relate, lhs) && numeric(&mut self.relate, rhs) {
                    return Ok(Type::Number);
                }
                Err(self.err(
                    format!("operator '+' cannot be applied to types '{lhs}' and '{rhs}'"),
                    span,
                ))
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if !numeric(&mut self.relate, lhs) || !numeric(&mut self.relate, rhs) {
                    return Err(self.err(
                        format!(
                            "arithmetic operands must be numbers, found '{lhs}' and '{rhs}'"
                        ),
                        span,
                    ));
                }
                Ok(Type::Number)
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => Ok(Type::Boolean),
            BinaryOp::EqLoose
            | BinaryOp::NeqLoose
            | BinaryOp::EqStrict
            | BinaryOp::NeqStrict => Ok(Type::Boolean),
            BinaryOp::Instanceof => match rhs {
                Type::Ctor(_) | Type::Any => Ok(Type::Boolean),
                other => Err(self.err(
                    format!("the right-hand side of 'instanceof' must be a class, found '{other}'"),
                    span,
                )),
            },
            BinaryOp::In => Ok(Type::Boolean),
        }
    }

    fn check_assignment(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> TResult<Type> {
        let value_ty = self.check_expression(value)?;

        match &target.kind {
            ExprKind::Ident(name) => {
                let Some(variable) = self.scope.find_variable(name) else {
                    return Err(self.err(format!("cannot find name '{name}'"), span));
                };
                if !variable.is_mutable {
                    return Err(self.err(
                        format!("cannot assign to '{name}' because it is a constant"),
                        span,
                    ));
                }
                self.types.insert(target.id, variable.ty.clone());
                if op == AssignOp::Assign {
                    self.check_assignable(&value_ty, &variable.ty.widened(), span)?;
                } else {
                    self.binary_type(assign_binary_op(op), &variable.ty, &value_ty, span)?;
                }
                Ok(value_ty)
            }
            ExprKind::Member { object, property } => {
                let target_ty = self.check_member(object, property, span)?;
                self.types.insert(target.id, target_ty.clone());
                // readonly members may only be written while their own
                // constructor runs
                if let MemberKey::Dot(name) = property {
                    let object_ty = self.types.get(&object.id).cloned();
                    if let Some(Type::Class(class, _)) = object_ty {
                        if let Some(member) = class.member(name, false) {
                            let in_own_ctor = self
                                .ctor_of
                                .as_ref()
                                .is_some_and(|c| Rc::ptr_eq(c, &class));
                            if member.readonly && !in_own_ctor {
                                return Err(self.err(
                                    format!(
                                        "cannot assign to '{name}' because it is a read-only property"
                                    ),
                                    span,
                                ));
                            }
                        }
                    }
                }
                if op == AssignOp::Assign {
                    if !matches!(target_ty, Type::Any) {
                        self.check_assignable(&value_ty, &target_ty.widened(), span)?;
                    }
                } else {
                    self.binary_type(assign_binary_op(op), &target_ty, &value_ty, span)?;
                }
                Ok(value_ty)
            }
            ExprKind::Grouping(inner) => self.check_assignment(op, inner, value, span),
            _ => Err(self.err("invalid assignment target", span)),
        }
    }

    fn check_member(
        &mut self,
        object: &Expression,
        property: &MemberKey,
        span: Span,
    ) -> TResult<Type> {
        if matches!(object.kind, ExprKind::Super) {
            let Some(ThisCtx::Instance(Type::Class(class, _))) = self.this_stack.last().cloned()
            else {
                return Err(self.err("'super' is only valid inside class members", span));
            };
            let Some(parent) = class.parent.borrow().clone() else {
                return Err(self.err("'super' used in a class without a base class", span));
            };
            let MemberKey::Dot(name) = property else {
                return Err(self.err("'super' members must be accessed by name", span));
            };
            return match parent.member(name, false) {
                Some(member) => Ok(member.ty),
                None => Err(self.err(
                    format!("property '{name}' does not exist on the base class"),
                    span,
                )),
            };
        }

        let object_ty = self.check_expression(object)?;
        match property {
            MemberKey::Dot(name) => self.property_type(&object_ty, name, span),
            MemberKey::Bracket(key) => {
                let key_ty = self.check_expression(key)?;
                match &key_ty {
                    Type::StringLit(name) => {
                        self.property_type(&object_ty, &name.clone(), span)
                    }
                    Type::Symbol => Ok(Type::Any),
                    _ => self.resolve_index_access(&object_ty, &key_ty, span),
                }
            }
        }
    }

    fn property_type(&mut self, object_ty: &Type, name: &str, span: Span) -> TResult<Type> {
        match object_ty {
            Type::Any => Ok(Type::Any),
            Type::String | Type::StringLit(_) => {
                if name == "length" {
                    Ok(Type::Number)
                } else {
                    // string builtin methods are typed by the host
                    Ok(Type::Any)
                }
            }
            Type::Number | Type::NumberLit(_) | Type::Boolean | Type::BoolLit(_) | Type::Symbol => {
                Ok(Type::Any)
            }
            Type::Array(element) => match name {
                "length" => Ok(Type::Number),
                "push" | "pop" | "shift" | "unshift" | "slice" | "indexOf" | "includes"
                | "join" | "concat" | "map" | "filter" | "forEach" | "reduce" | "find"
                | "some" | "every" | "toString" => Ok(Type::Any),
                _ => Err(self.err(
                    format!("property '{name}' does not exist on type '{}[]'", element),
                    span,
                )),
            },
            Type::Tuple(_) => Ok(Type::Any),
            Type::Class(class, args) => {
                let member = class.member(name, false);
                match member {
                    Some(member) => {
                        if member.access == Access::Private {
                            let inside = matches!(
                                self.this_stack.last(),
                                Some(ThisCtx::Instance(Type::Class(current, _)))
                                    if Rc::ptr_eq(current, class) || current.derives_from(class)
                            );
                            if !inside {
                                return Err(self.err(
                                    format!(
                                        "property '{name}' is private and only accessible within class '{}'",
                                        class.name
                                    ),
                                    span,
                                ));
                            }
                        }
                        let params = class.type_params.borrow();
                        let map: HashMap<String, Type> = params
                            .iter()
                            .map(|p| p.name.clone())
                            .zip(args.iter().cloned())
                            .collect();
                        Ok(substitute(&member.ty, &map))
                    }
                    None => Err(self.err(
                        format!(
                            "property '{name}' does not exist on type '{}'",
                            class.name
                        ),
                        span,
                    )),
                }
            }
            Type::Ctor(class) => {
                if name == "name" {
                    return Ok(Type::String);
                }
                match class.member(name, true) {
                    Some(member) => Ok(member.ty),
                    None => Err(self.err(
                        format!(
                            "property '{name}' does not exist on 'typeof {}'",
                            class.name
                        ),
                        span,
                    )),
                }
            }
            Type::Interface(..) | Type::Object(_) | Type::Intersection(_) => {
                let shape = shape_of(object_ty).unwrap_or_else(|| assignable::Shape {
                    props: vec![],
                    string_index: None,
                    number_index: None,
                });
                match shape.props.iter().find(|p| p.name == name) {
                    Some(prop) => Ok(prop.ty.clone()),
                    None => match shape.string_index {
                        Some(index) => Ok(index),
                        None => Err(self.err(
                            format!(
                                "property '{name}' does not exist on type '{object_ty}'"
                            ),
                            span,
                        )),
                    },
                }
            }
            Type::Union(arms) => {
                let mut member_types = vec![];
                for arm in arms {
                    member_types.push(self.property_type(arm, name, span)?);
                }
                Ok(Type::union_of(member_types))
            }
            Type::Function(_) => Ok(Type::Any),
            Type::Null | Type::Undefined => Err(self.err(
                format!("object is possibly '{object_ty}'"),
                span,
            )),
            Type::TypeParam(param) => {
                match self.relate.constraints.get(param).cloned().flatten() {
                    Some(constraint) => self.property_type(&constraint, name, span),
                    None => Err(self.err(
                        format!("property '{name}' does not exist on type '{param}'"),
                        span,
                    )),
                }
            }
            _ => Ok(Type::Any),
        }
    }

    fn check_call(
        &mut self,
        callee: &Expression,
        args: &[Argument],
        span: Span,
    ) -> TResult<Type> {
        // super(...) constructor calls
        let unwrapped = match &callee.kind {
            ExprKind::Grouping(inner) => inner.as_ref(),
            _ => callee,
        };
        if matches!(unwrapped.kind, ExprKind::Super) {
            let Some(ThisCtx::Instance(Type::Class(class, _))) = self.this_stack.last().cloned()
            else {
                return Err(self.err("'super' is only valid inside class members", span));
            };
            let Some(parent) = class.parent.borrow().clone() else {
                return Err(self.err("'super' used in a class without a base class", span));
            };
            let arg_types = self.check_arguments(args)?;
            if let Some(ctor) = parent.member("constructor", false) {
                if let Type::Function(func) = &ctor.ty {
                    self.resolve_overloads(&func.signatures, &arg_types, args, span)?;
                }
            }
            return Ok(Type::Void);
        }

        let callee_ty = self.check_expression(callee)?;
        let arg_types = self.check_arguments(args)?;

        match &callee_ty {
            Type::Any => Ok(Type::Any),
            Type::Function(func) => {
                self.resolve_overloads(&func.signatures, &arg_types, args, span)
            }
            Type::Ctor(class) => Err(self.err(
                format!(
                    "class constructor '{}' cannot be invoked without 'new'",
                    class.name
                ),
                span,
            )),
            other => Err(self.err(
                format!("this expression is not callable: type '{other}'"),
                span,
            )),
        }
    }

    fn check_arguments(&mut self, args: &[Argument]) -> TResult<Vec<Type>> {
        let mut types = vec![];
        for arg in args {
            let ty = self.check_expression(&arg.expr)?;
            if arg.spread {
                types.push(self.element_type(&ty, arg.expr.span)?);
            } else {
                types.push(ty);
            }
        }
        Ok(types)
    }

    /// Pick the first declared signature, in source order, whose parameters
    /// are assignable from the call arguments.
    fn resolve_overloads(
        &mut self,
        signatures: &[Signature],
        arg_types: &[Type],
        args: &[Argument],
        span: Span,
    ) -> TResult<Type> {
        let mut first_error = None;
        for signature in signatures {
            match self.try_signature(signature, arg_types, span) {
                Ok(ret) => return Ok(ret),
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        let _ = args;
        if signatures.len() > 1 {
            Err(self.err("no overload matches this call", span))
        } else {
            Err(first_error.unwrap_or_else(|| self.err("call signature mismatch", span)))
        }
    }

    fn try_signature(
        &mut self,
        signature: &Signature,
        arg_types: &[Type],
        span: Span,
    ) -> TResult<Type> {
        let required = signature.required_params();
        let max = if signature.has_rest() {
            usize::MAX
        } else {
            signature.params.len()
        };
        if arg_types.len() < required || arg_types.len() > max {
            return Err(self.err(
                format!(
                    "expected {required} argument{} but got {}",
                    if required == 1 { "" } else { "s" },
                    arg_types.len()
                ),
                span,
            ));
        }

        // inference flows left-to-right through the arguments
        let mut bindings: HashMap<String, Type> = HashMap::new();
        let targets: Vec<String> = signature
            .type_params
            .iter()
            .map(|p| p.name.clone())
            .collect();
        if !targets.is_empty() {
            for (index, arg_ty) in arg_types.iter().enumerate() {
                let param_ty = self.param_type_at(signature, index);
                if let Err(message) =
                    self.relate.unify(&param_ty, arg_ty, &targets, &mut bindings)
                {
                    return Err(self.err(message, span));
                }
            }
            for param in &signature.type_params {
                let inferred = bindings.entry(param.name.clone()).or_insert(Type::Any);
                let inferred = inferred.clone();
                if let Some(constraint) = &param.constraint {
                    let constraint = substitute(constraint, &bindings);
                    if !self.relate.assignable(&inferred, &constraint) {
                        return Err(self.err(
                            format!(
                                "type '{inferred}' does not satisfy the constraint '{constraint}' of type parameter '{}'",
                                param.name
                            ),
                            span,
                        ));
                    }
                }
            }
        }

        for (index, arg_ty) in arg_types.iter().enumerate() {
            let param_ty = substitute(&self.param_type_at(signature, index), &bindings);
            if !self.relate.assignable(arg_ty, &param_ty) {
                return Err(TypeError::mismatch(param_ty, arg_ty.clone(), span));
            }
        }

        Ok(substitute(&signature.ret, &bindings))
    }

    fn param_type_at(&self, signature: &Signature, index: usize) -> Type {
        if index < signature.params.len() {
            let param = &signature.params[index];
            if param.rest {
                if let Type::Array(element) = &param.ty {
                    return (**element).clone();
                }
            }
            return param.ty.clone();
        }
        if let Some(last) = signature.params.last() {
            if last.rest {
                if let Type::Array(element) = &last.ty {
                    return (**element).clone();
                }
                return last.ty.clone();
            }
        }
        Type::Any
    }

    fn check_new(
        &mut self,
        callee: &Expression,
        type_args: &[TypeExpr],
        args: &[Argument],
        span: Span,
    ) -> TResult<Type> {
        let callee_ty = self.check_expression(callee)?;
        let arg_types = self.check_arguments(args)?;

        match &callee_ty {
            Type::Any => Ok(Type::Any),
            Type::Ctor(class) => {
                if *class.is_abstract.borrow() {
                    return Err(self.err(
                        format!("cannot create an instance of abstract class '{}'", class.name),
                        span,
                    ));
                }
                let params = class.type_params.borrow().clone();
                let mut resolved_args = vec![];
                for arg in type_args {
                    resolved_args.push(self.resolve_type(arg)?);
                }

                let ctor = class.member("constructor", false);
                let bindings: HashMap<String, Type> = if !params.is_empty() {
                    if !resolved_args.is_empty() {
                        self.check_type_args(&params, &resolved_args, span)?;
                        params
                            .iter()
                            .map(|p| p.name.clone())
                            .zip(resolved_args.iter().cloned())
                            .collect()
                    } else if let Some(ClassMemberType {
                        ty: Type::Function(func),
                        ..
                    }) = &ctor
                    {
                        // infer class type arguments from constructor
                        // arguments, left to right
                        let mut bindings = HashMap::new();
                        let targets: Vec<String> =
                            params.iter().map(|p| p.name.clone()).collect();
                        if let Some(signature) = func.signatures.first() {
                            for (index, arg_ty) in arg_types.iter().enumerate() {
                                let param_ty = self.param_type_at(signature, index);
                                if let Err(message) =
                                    self.relate.unify(&param_ty, arg_ty, &targets, &mut bindings)
                                {
                                    return Err(self.err(message, span));
                                }
                            }
                        }
                        for name in &targets {
                            bindings.entry(name.clone()).or_insert(Type::Any);
                        }
                        bindings
                    } else {
                        params
                            .iter()
                            .map(|p| (p.name.clone(), Type::Any))
                            .collect()
                    }
                } else {
                    HashMap::new()
                };

                if let Some(ClassMemberType {
                    ty: Type::Function(func),
                    ..
                }) = &ctor
                {
                    let substituted: Vec<Signature> = func
                        .signatures
                        .iter()
                        .map(|s| Signature {
                            type_params: vec![],
                            params: s
                                .params
                                .iter()
                                .map(|p| ParamType {
                                    name: p.name.clone(),
                                    ty: substitute(&p.ty, &bindings),
                                    optional: p.optional,
                                    rest: p.rest,
                                })
                                .collect(),
                            ret: Type::Void,
                        })
                        .collect();
                    self.resolve_overloads(&substituted, &arg_types, args, span)?;
                } else if !arg_types.is_empty() && class.parent.borrow().is_none() {
                    return Err(self.err(
                        format!("expected 0 arguments but got {}", arg_types.len()),
                        span,
                    ));
                }

                let final_args: Vec<Type> = params
                    .iter()
                    .map(|p| bindings.get(&p.name).cloned().unwrap_or(Type::Any))
                    .collect();
                Ok(Type::Class(class.clone(), final_args))
            }
            other => Err(self.err(format!("type '{other}' is not a constructor"), span)),
        }
    }

    fn check_object_literal(&mut self, props: &[ObjectProp]) -> TResult<Type> {
        let mut object = ObjectType::default();
        for prop in props {
            match prop {
                ObjectProp::KeyValue { key, value } => {
                    let value_ty = self.check_expression(value)?;
                    if let Some(name) = literal_prop_name(key) {
                        object.props.push(PropType {
                            name,
                            ty: value_ty.widened(),
                            optional: false,
                            readonly: false,
                        });
                    } else if let PropKey::Computed(expr) = key {
                        self.check_expression(expr)?;
                    }
                }
                ObjectProp::Shorthand(name) => {
                    let ty = match self.scope.find_variable(name) {
                        Some(variable) => variable.ty,
                        None => {
                            return Err(TypeError::new(
                                format!("cannot find name '{name}'"),
                                Span::default(),
                            ))
                        }
                    };
                    object.props.push(PropType {
                        name: name.clone(),
                        ty: ty.widened(),
                        optional: false,
                        readonly: false,
                    });
                }
                ObjectProp::Spread(expr) => {
                    let spread_ty = self.check_expression(expr)?;
                    if let Some(shape) = shape_of(&spread_ty) {
                        for prop in shape.props {
                            if !object.props.iter().any(|p| p.name == prop.name) {
                                object.props.push(prop);
                            }
                        }
                    }
                }
                ObjectProp::Getter { key, func } => {
                    self.check_function_body(func, ThisCtx::Outside)?;
                    let ret = match &func.return_type {
                        Some(annotation) => self.resolve_type(annotation)?,
                        None => Type::Any,
                    };
                    if let Some(name) = literal_prop_name(key) {
                        object.props.push(PropType {
                            name,
                            ty: ret,
                            optional: false,
                            readonly: false,
                        });
                    }
                }
                ObjectProp::Setter { func, .. } => {
                    self.check_function_body(func, ThisCtx::Outside)?;
                }
            }
        }
        Ok(Type::Object(Rc::new(object)))
    }
}

fn literal_prop_name(key: &PropKey) -> Option<String> {
    match key {
        PropKey::Ident(name) | PropKey::Str(name) => Some(name.clone()),
        PropKey::Number(n) => Some(crate::runtime::format_number(*n)),
        PropKey::Computed(_) => None,
    }
}

fn assign_binary_op(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
        AssignOp::Rem => BinaryOp::Rem,
        AssignOp::Assign => BinaryOp::EqStrict,
    }
}

fn unwrap_export(stmt: &Statement) -> &StmtKind {
    match &stmt.kind {
        StmtKind::Export(inner) => &inner.kind,
        other => other,
    }
}

/// The ambient global bindings every program checks against. Host-provided
/// namespaces are typed loosely; user-declared structure is what the
/// checker enforces strictly.
fn setup_scope(scope: &mut TypeScope) {
    for name in [
        "console",
        "Math",
        "Object",
        "Symbol",
        "Buffer",
        "Number",
        "Map",
        "Set",
        "WeakMap",
        "WeakSet",
        "Error",
        "TypeError",
        "RangeError",
        "ReferenceError",
        "SyntaxError",
        "URIError",
        "EvalError",
        "AggregateError",
        "globalThis",
    ] {
        scope.set_variable(name, Type::Any, false);
    }
    scope.set_variable("undefined", Type::Undefined, false);
    scope.set_variable("NaN", Type::Number, false);
    scope.set_variable("Infinity", Type::Number, false);
}
