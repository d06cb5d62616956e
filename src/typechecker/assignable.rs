//! The assignability relation and call-site unification. Structural
//! comparisons are memoized on (lhs, rhs) pairs so recursive object types
//! terminate.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::types::{PropType, Signature, Type};

#[derive(Default)]
pub struct Relate {
    /// Pairs currently being compared, keyed by rendered type names.
    /// A pair seen again during its own comparison is assumed compatible.
    in_progress: HashSet<(String, String)>,
    /// Constraints of the generic type parameters currently in scope.
    pub constraints: HashMap<String, Option<Type>>,
}

impl Relate {
    /// May a value of type `from` be stored where `to` is expected?
    pub fn assignable(&mut self, from: &Type, to: &Type) -> bool {
        use Type::*;

        if from == to {
            return true;
        }
        match (from, to) {
            (Any, _) | (_, Any) => return true,
            (Never, _) => return true,
            (_, Never) => return false,
            _ => {}
        }

        // unions distribute before anything structural
        if let Union(arms) = from {
            return arms.iter().all(|arm| self.assignable(arm, to));
        }
        if let Union(arms) = to {
            return arms.iter().any(|arm| self.assignable(from, arm));
        }
        if let Intersection(arms) = to {
            return arms.iter().all(|arm| self.assignable(from, arm));
        }
        if let Intersection(arms) = from {
            return arms.iter().any(|arm| self.assignable(arm, to));
        }

        match (from, to) {
            (Number, Number)
            | (String, String)
            | (Boolean, Boolean)
            | (Symbol, Symbol)
            | (Null, Null)
            | (Undefined, Undefined)
            | (Void, Void) => true,
            (Undefined, Void) => true,
            (Void, Undefined) => true,

            (NumberLit(_), Number) | (StringLit(_), String) | (BoolLit(_), Boolean) => true,
            (NumberLit(a), NumberLit(b)) => a == b,
            (StringLit(a), StringLit(b)) => a == b,
            (BoolLit(a), BoolLit(b)) => a == b,

            (TypeParam(a), TypeParam(b)) if a == b => true,
            (TypeParam(name), to) => match self.constraints.get(name).cloned().flatten() {
                Some(constraint) => self.assignable(&constraint, to),
                None => false,
            },
            (_, TypeParam(_)) => false,

            (Tuple(from_els), Tuple(to_els)) => {
                from_els.len() == to_els.len()
                    && from_els
                        .iter()
                        .zip(to_els)
                        .all(|(f, t)| self.assignable(f, t))
            }
            (Tuple(from_els), Array(element)) => {
                from_els.iter().all(|f| self.assignable(f, element))
            }
            (Array(from_el), Array(to_el)) => self.assignable(from_el, to_el),

            (Function(from_fn), Function(to_fn)) => to_fn.signatures.iter().all(|target| {
                from_fn
                    .signatures
                    .iter()
                    .any(|source| self.signature_assignable(source, target))
            }),

            (Ctor(from_class), Ctor(to_class)) => from_class.derives_from(to_class),

            // class identity is nominal: derived-to-base only
            (Class(from_class, from_args), Class(to_class, to_args)) => {
                if Rc::ptr_eq(from_class, to_class) {
                    from_args.len() == to_args.len()
                        && from_args
                            .iter()
                            .zip(to_args)
                            .all(|(f, t)| self.assignable(f, t))
                } else {
                    from_class.derives_from(to_class)
                }
            }

            // everything else object-like compares structurally
            _ => self.structural_assignable(from, to),
        }
    }

    fn signature_assignable(&mut self, source: &Signature, target: &Signature) -> bool {
        // a function expecting fewer parameters is callable where one
        // expecting more is wanted
        let source_params: Vec<_> = source.params.iter().filter(|p| !p.rest).collect();
        let target_params: Vec<_> = target.params.iter().filter(|p| !p.rest).collect();
        if source_params.len() > target_params.len() && !source.has_rest() {
            return false;
        }
        for (source_param, target_param) in source_params.iter().zip(&target_params) {
            // parameters relate contravariantly
            if !self.assignable(&target_param.ty, &source_param.ty) {
                return false;
            }
        }
        if matches!(target.ret, Type::Void) {
            return true;
        }
        self.assignable(&source.ret, &target.ret)
    }

    fn structural_assignable(&mut self, from: &Type, to: &Type) -> bool {
        // only genuinely object-like targets compare structurally
        if !matches!(
            to,
            Type::Object(_) | Type::Interface(..) | Type::Class(..) | Type::Intersection(_)
        ) {
            return false;
        }
        let Some(to_shape) = shape_of(to) else {
            return false;
        };
        let Some(from_shape) = shape_of(from) else {
            return false;
        };

        let key = (from.to_string(), to.to_string());
        if self.in_progress.contains(&key) {
            return true;
        }
        self.in_progress.insert(key.clone());
        let result = self.shapes_assignable(&from_shape, &to_shape);
        self.in_progress.remove(&key);
        result
    }

    fn shapes_assignable(&mut self, from: &Shape, to: &Shape) -> bool {
        for target_prop in &to.props {
            match from.props.iter().find(|p| p.name == target_prop.name) {
                Some(source_prop) => {
                    if !self.assignable(&source_prop.ty, &target_prop.ty) {
                        return false;
                    }
                }
                None => {
                    // optional properties need not exist
                    if !target_prop.optional {
                        return false;
                    }
                }
            }
        }
        if let Some(index) = &to.string_index {
            for source_prop in &from.props {
                if !self.assignable(&source_prop.ty, index) {
                    return false;
                }
            }
            if let Some(source_index) = &from.string_index {
                if !self.assignable(source_index, index) {
                    return false;
                }
            }
        }
        if let (Some(source_index), Some(index)) = (&from.number_index, &to.number_index) {
            if !self.assignable(source_index, index) {
                return false;
            }
        }
        true
    }

    // -- inference ---------------------------------------------------------

    /// Unify a parameter type with an argument type, collecting bindings
    /// for the inference targets. Flows through covariant positions;
    /// ambiguity resolves to the broadest common type and contradiction is
    /// an error.
    pub fn unify(
        &mut self,
        param: &Type,
        arg: &Type,
        targets: &[String],
        bindings: &mut HashMap<String, Type>,
    ) -> Result<(), String> {
        match (param, arg) {
            (Type::TypeParam(name), arg) if targets.contains(name) => {
                match bindings.get(name).cloned() {
                    None => {
                        bindings.insert(name.clone(), arg.clone());
                    }
                    Some(existing) => {
                        if self.assignable(arg, &existing) {
                            // keep the broader existing binding
                        } else if self.assignable(&existing, arg) {
                            bindings.insert(name.clone(), arg.clone());
                        } else {
                            // ambiguity resolves to the broadest common type
                            let widened_arg = arg.widened();
                            let widened_existing = existing.widened();
                            if self.assignable(&widened_existing, &widened_arg) {
                                bindings.insert(name.clone(), widened_arg);
                            } else if self.assignable(&widened_arg, &widened_existing) {
                                bindings.insert(name.clone(), widened_existing);
                            } else {
                                return Err(format!(
                                    "conflicting inferences for type parameter '{name}': '{existing}' and '{arg}'"
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            (Type::Array(param_el), Type::Array(arg_el)) => {
                self.unify(param_el, arg_el, targets, bindings)
            }
            (Type::Array(param_el), Type::Tuple(arg_els)) => {
                for arg_el in arg_els {
                    self.unify(param_el, arg_el, targets, bindings)?;
                }
                Ok(())
            }
            (Type::Tuple(param_els), Type::Tuple(arg_els)) => {
                for (param_el, arg_el) in param_els.iter().zip(arg_els) {
                    self.unify(param_el, arg_el, targets, bindings)?;
                }
                Ok(())
            }
            (Type::Union(arms), arg) => {
                // try the first arm that structurally matches
                for arm in arms {
                    if self.unify(arm, arg, targets, bindings).is_ok() {
                        return Ok(());
                    }
                }
                Ok(())
            }
            (Type::Function(param_fn), Type::Function(arg_fn)) => {
                if let (Some(param_sig), Some(arg_sig)) =
                    (param_fn.signatures.first(), arg_fn.signatures.first())
                {
                    self.unify(&param_sig.ret, &arg_sig.ret, targets, bindings)?;
                }
                Ok(())
            }
            (param, arg) => {
                let (Some(param_shape), Some(arg_shape)) = (shape_of(param), shape_of(arg)) else {
                    return Ok(());
                };
                for param_prop in &param_shape.props {
                    if let Some(arg_prop) = arg_shape
                        .props
                        .iter()
                        .find(|p| p.name == param_prop.name)
                    {
                        self.unify(&param_prop.ty, &arg_prop.ty, targets, bindings)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// The structural view of an object-like type.
pub struct Shape {
    pub props: Vec<PropType>,
    pub string_index: Option<Type>,
    pub number_index: Option<Type>,
}

/// Substitute type parameters by name throughout a type.
pub fn substitute(ty: &Type, map: &HashMap<String, Type>) -> Type {
    if map.is_empty() {
        return ty.clone();
    }
    match ty {
        Type::TypeParam(name) => map.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Array(element) => Type::Array(Box::new(substitute(element, map))),
        Type::Tuple(elements) => {
            Type::Tuple(elements.iter().map(|e| substitute(e, map)).collect())
        }
        Type::Union(arms) => Type::Union(arms.iter().map(|a| substitute(a, map)).collect()),
        Type::Intersection(arms) => {
            Type::Intersection(arms.iter().map(|a| substitute(a, map)).collect())
        }
        Type::Object(obj) => Type::Object(Rc::new(super::types::ObjectType {
            props: obj
                .props
                .iter()
                .map(|p| PropType {
                    name: p.name.clone(),
                    ty: substitute(&p.ty, map),
                    optional: p.optional,
                    readonly: p.readonly,
                })
                .collect(),
            string_index: obj.string_index.as_ref().map(|t| substitute(t, map)),
            number_index: obj.number_index.as_ref().map(|t| substitute(t, map)),
            symbol_index: obj.symbol_index.as_ref().map(|t| substitute(t, map)),
        })),
        Type::Function(func) => {
            let signatures = func
                .signatures
                .iter()
                .map(|signature| {
                    // an inner parameter with the same name shadows
                    let mut inner = map.clone();
                    for tp in &signature.type_params {
                        inner.remove(&tp.name);
                    }
                    Signature {
                        type_params: signature.type_params.clone(),
                        params: signature
                            .params
                            .iter()
                            .map(|p| super::types::ParamType {
                                name: p.name.clone(),
                                ty: substitute(&p.ty, &inner),
                                optional: p.optional,
                                rest: p.rest,
                            })
                            .collect(),
                        ret: substitute(&signature.ret, &inner),
                    }
                })
                .collect();
            Type::Function(Rc::new(super::types::FunctionType { signatures }))
        }
        Type::Class(class, args) => Type::Class(
            class.clone(),
            args.iter().map(|a| substitute(a, map)).collect(),
        ),
        Type::Interface(interface, args) => Type::Interface(
            interface.clone(),
            args.iter().map(|a| substitute(a, map)).collect(),
        ),
        Type::KeyOf(operand) => Type::KeyOf(Box::new(substitute(operand, map))),
        Type::IndexAccess(target, index) => Type::IndexAccess(
            Box::new(substitute(target, map)),
            Box::new(substitute(index, map)),
        ),
        other => other.clone(),
    }
}

/// View an object-like type as its structural members. Strings and arrays
/// expose their `length` so constraints like `{ length: number }` accept
/// them.
pub fn shape_of(ty: &Type) -> Option<Shape> {
    match ty {
        Type::String | Type::StringLit(_) | Type::Array(_) | Type::Tuple(_) => Some(Shape {
            props: vec![PropType {
                name: "length".into(),
                ty: Type::Number,
                optional: false,
                readonly: true,
            }],
            string_index: None,
            number_index: None,
        }),
        Type::Object(obj) => Some(Shape {
            props: obj.props.clone(),
            string_index: obj.string_index.clone(),
            number_index: obj.number_index.clone(),
        }),
        Type::Interface(interface, args) => {
            let params = interface.type_params.borrow();
            let map: HashMap<String, Type> = params
                .iter()
                .map(|p| p.name.clone())
                .zip(args.iter().cloned())
                .collect();
            Some(Shape {
                props: interface
                    .all_members()
                    .iter()
                    .map(|p| PropType {
                        name: p.name.clone(),
                        ty: substitute(&p.ty, &map),
                        optional: p.optional,
                        readonly: p.readonly,
                    })
                    .collect(),
                string_index: interface
                    .string_index
                    .borrow()
                    .as_ref()
                    .map(|t| substitute(t, &map)),
                number_index: interface
                    .number_index
                    .borrow()
                    .as_ref()
                    .map(|t| substitute(t, &map)),
            })
        }
        Type::Class(class, args) => {
            let params = class.type_params.borrow();
            let map: HashMap<String, Type> = params
                .iter()
                .map(|p| p.name.clone())
                .zip(args.iter().cloned())
                .collect();
            let mut props = vec![];
            let mut current = Some(class.clone());
            while let Some(class) = current {
                for member in class.members.borrow().iter() {
                    if member.is_static || props.iter().any(|p: &PropType| p.name == member.name)
                    {
                        continue;
                    }
                    props.push(PropType {
                        name: member.name.clone(),
                        ty: substitute(&member.ty, &map),
                        optional: false,
                        readonly: member.readonly,
                    });
                }
                current = class.parent.borrow().clone();
            }
            Some(Shape {
                props,
                string_index: None,
                number_index: None,
            })
        }
        Type::Intersection(arms) => {
            let mut props: Vec<PropType> = vec![];
            let mut string_index = None;
            let mut number_index = None;
            for arm in arms {
                let shape = shape_of(arm)?;
                for prop in shape.props {
                    if !props.iter().any(|p| p.name == prop.name) {
                        props.push(prop);
                    }
                }
                string_index = string_index.or(shape.string_index);
                number_index = number_index.or(shape.number_index);
            }
            Some(Shape {
                props,
                string_index,
                number_index,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::ObjectType;

    fn object(props: Vec<(&str, Type, bool)>) -> Type {
        Type::Object(Rc::new(ObjectType {
            props: props
                .into_iter()
                .map(|(name, ty, optional)| PropType {
                    name: name.into(),
                    ty,
                    optional,
                    readonly: false,
                })
                .collect(),
            ..ObjectType::default()
        }))
    }

    #[test]
    fn test_primitives_assign_by_tag() {
        let mut relate = Relate::default();
        assert!(relate.assignable(&Type::Number, &Type::Number));
        assert!(!relate.assignable(&Type::Number, &Type::String));
        assert!(relate.assignable(&Type::Any, &Type::Number));
        assert!(relate.assignable(&Type::Never, &Type::Number));
        assert!(!relate.assignable(&Type::Number, &Type::Never));
    }

    #[test]
    fn test_null_needs_a_union() {
        let mut relate = Relate::default();
        assert!(!relate.assignable(&Type::Null, &Type::Number));
        let nullable = Type::Union(vec![Type::Number, Type::Null]);
        assert!(relate.assignable(&Type::Null, &nullable));
        assert!(relate.assignable(&Type::Number, &nullable));
    }

    #[test]
    fn test_union_source_requires_all_arms() {
        let mut relate = Relate::default();
        let source = Type::Union(vec![Type::Number, Type::String]);
        assert!(!relate.assignable(&source, &Type::Number));
        let target = Type::Union(vec![Type::Number, Type::String, Type::Boolean]);
        assert!(relate.assignable(&source, &target));
    }

    #[test]
    fn test_tuples_are_positional() {
        let mut relate = Relate::default();
        let pair = Type::Tuple(vec![Type::Number, Type::String]);
        let swapped = Type::Tuple(vec![Type::String, Type::Number]);
        assert!(!relate.assignable(&pair, &swapped));
        assert!(relate.assignable(&pair, &pair.clone()));
        assert!(!relate.assignable(
            &pair,
            &Type::Tuple(vec![Type::Number, Type::String, Type::Boolean])
        ));
        assert!(relate.assignable(&pair, &Type::Array(Box::new(Type::Union(vec![
            Type::Number,
            Type::String
        ])))));
    }

    #[test]
    fn test_object_width_subtyping() {
        let mut relate = Relate::default();
        let wide = object(vec![("a", Type::Number, false), ("b", Type::String, false)]);
        let narrow = object(vec![("a", Type::Number, false)]);
        assert!(relate.assignable(&wide, &narrow));
        assert!(!relate.assignable(&narrow, &wide));

        let optional = object(vec![("a", Type::Number, false), ("b", Type::String, true)]);
        assert!(relate.assignable(&narrow, &optional));
    }

    #[test]
    fn test_function_parameter_contravariance() {
        let mut relate = Relate::default();
        let takes_one = Type::Function(super::super::types::FunctionType::single(Signature {
            type_params: vec![],
            params: vec![super::super::types::ParamType {
                name: "x".into(),
                ty: Type::Number,
                optional: false,
                rest: false,
            }],
            ret: Type::Number,
        }));
        let takes_two = Type::Function(super::super::types::FunctionType::single(Signature {
            type_params: vec![],
            params: vec![
                super::super::types::ParamType {
                    name: "x".into(),
                    ty: Type::Number,
                    optional: false,
                    rest: false,
                },
                super::super::types::ParamType {
                    name: "y".into(),
                    ty: Type::String,
                    optional: false,
                    rest: false,
                },
            ],
            ret: Type::Number,
        }));
        // fewer-expected is callable as more-expected, not the reverse
        assert!(relate.assignable(&takes_one, &takes_two));
        assert!(!relate.assignable(&takes_two, &takes_one));
    }

    #[test]
    fn test_inference_broadens_to_common_type() {
        let mut relate = Relate::default();
        let mut bindings = HashMap::new();
        let targets = vec!["T".to_string()];
        relate
            .unify(
                &Type::TypeParam("T".into()),
                &Type::NumberLit(1.0),
                &targets,
                &mut bindings,
            )
            .unwrap();
        relate
            .unify(
                &Type::TypeParam("T".into()),
                &Type::Number,
                &targets,
                &mut bindings,
            )
            .unwrap();
        assert_eq!(bindings.get("T"), Some(&Type::Number));

        let conflict = relate.unify(
            &Type::TypeParam("T".into()),
            &Type::String,
            &targets,
            &mut bindings,
        );
        assert!(conflict.is_err());
    }
}
