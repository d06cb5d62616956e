use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use crate::parser::ast::Access;

/// The checker's semantic type representation. Structural except for class
/// identity, which is nominal through the `Rc` pointer.
#[derive(Debug, Clone)]
pub enum Type {
    Number,
    String,
    Boolean,
    Symbol,
    Null,
    Undefined,
    Void,
    Any,
    Never,
    NumberLit(f64),
    StringLit(String),
    BoolLit(bool),
    Array(Box<Type>),
    Tuple(Vec<Type>),
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Object(Rc<ObjectType>),
    Function(Rc<FunctionType>),
    /// An instance of a class, with any type arguments it was
    /// instantiated with.
    Class(Rc<ClassType>, Vec<Type>),
    /// The constructor value bound to a class name.
    Ctor(Rc<ClassType>),
    Interface(Rc<InterfaceType>, Vec<Type>),
    /// A reference to an in-scope generic type parameter.
    TypeParam(String),
    KeyOf(Box<Type>),
    IndexAccess(Box<Type>, Box<Type>),
}

impl PartialEq for Type {
    /// Shallow identity, used for memoization keys and trivial equality.
    /// Semantic compatibility goes through assignability instead.
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (NumberLit(a), NumberLit(b)) => a == b,
            (StringLit(a), StringLit(b)) => a == b,
            (BoolLit(a), BoolLit(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Union(a), Union(b)) => a == b,
            (Intersection(a), Intersection(b)) => a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Class(a, x), Class(b, y)) => Rc::ptr_eq(a, b) && x == y,
            (Ctor(a), Ctor(b)) => Rc::ptr_eq(a, b),
            (Interface(a, x), Interface(b, y)) => Rc::ptr_eq(a, b) && x == y,
            (TypeParam(a), TypeParam(b)) => a == b,
            (KeyOf(a), KeyOf(b)) => a == b,
            (IndexAccess(a, b), IndexAccess(c, d)) => a == c && b == d,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Type {
    /// Widen a literal singleton to its base primitive.
    pub fn widened(&self) -> Type {
        match self {
            Type::NumberLit(_) => Type::Number,
            Type::StringLit(_) => Type::String,
            Type::BoolLit(_) => Type::Boolean,
            Type::Union(arms) => Type::Union(arms.iter().map(Type::widened).collect()),
            other => other.clone(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Type::Null | Type::Undefined)
    }

    pub fn union_of(mut arms: Vec<Type>) -> Type {
        arms.dedup();
        if arms.len() == 1 {
            arms.pop().unwrap()
        } else {
            Type::Union(arms)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropType {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
    pub readonly: bool,
}

#[derive(Debug, Default)]
pub struct ObjectType {
    pub props: Vec<PropType>,
    pub string_index: Option<Type>,
    pub number_index: Option<Type>,
    pub symbol_index: Option<Type>,
}

impl ObjectType {
    pub fn prop(&self, name: &str) -> Option<&PropType> {
        self.props.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParamDecl {
    pub name: String,
    pub constraint: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamType {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<ParamType>,
    pub ret: Type,
}

impl Signature {
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !p.optional && !p.rest)
            .count()
    }

    pub fn has_rest(&self) -> bool {
        self.params.last().is_some_and(|p| p.rest)
    }
}

/// A function type: one or more call signatures. More than one signature
/// is an overload set, resolved in source order.
#[derive(Debug)]
pub struct FunctionType {
    pub signatures: Vec<Signature>,
}

impl FunctionType {
    pub fn single(signature: Signature) -> Rc<FunctionType> {
        Rc::new(FunctionType {
            signatures: vec![signature],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone)]
pub struct ClassMemberType {
    pub name: String,
    pub ty: Type,
    pub kind: MemberKind,
    pub is_static: bool,
    pub is_abstract: bool,
    pub readonly: bool,
    pub access: Access,
}

/// A class: structural members plus nominal identity. Populated after
/// construction so mutually recursive classes can reference each other.
pub struct ClassType {
    pub name: String,
    pub type_params: RefCell<Vec<TypeParamDecl>>,
    pub members: RefCell<Vec<ClassMemberType>>,
    pub parent: RefCell<Option<Rc<ClassType>>>,
    pub interfaces: RefCell<Vec<Rc<InterfaceType>>>,
    pub is_abstract: RefCell<bool>,
}

impl std::fmt::Debug for ClassType {
    /// Name only: members can reference the class itself.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassType({})", self.name)
    }
}

impl ClassType {
    pub fn shell(name: &str) -> Rc<ClassType> {
        Rc::new(ClassType {
            name: name.to_string(),
            type_params: RefCell::new(vec![]),
            members: RefCell::new(vec![]),
            parent: RefCell::new(None),
            interfaces: RefCell::new(vec![]),
            is_abstract: RefCell::new(false),
        })
    }

    /// Find an instance member, walking the inheritance chain.
    pub fn member(self: &Rc<Self>, name: &str, is_static: bool) -> Option<ClassMemberType> {
        if let Some(member) = self
            .members
            .borrow()
            .iter()
            .find(|m| m.name == name && m.is_static == is_static)
        {
            return Some(member.clone());
        }
        self.parent.borrow().as_ref()?.member(name, is_static)
    }

    /// All inherited abstract members a concrete class must implement.
    pub fn abstract_obligations(self: &Rc<Self>) -> Vec<String> {
        let mut obligations = vec![];
        let mut current = self.parent.borrow().clone();
        while let Some(class) = current {
            for member in class.members.borrow().iter() {
                if member.is_abstract {
                    obligations.push(member.name.clone());
                }
            }
            current = class.parent.borrow().clone();
        }
        obligations
    }

    pub fn derives_from(self: &Rc<Self>, ancestor: &Rc<ClassType>) -> bool {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if Rc::ptr_eq(&class, ancestor) {
                return true;
            }
            current = class.parent.borrow().clone();
        }
        false
    }
}

pub struct InterfaceType {
    pub name: String,
    pub type_params: RefCell<Vec<TypeParamDecl>>,
    pub members: RefCell<Vec<PropType>>,
    pub extends: RefCell<Vec<Rc<InterfaceType>>>,
    pub string_index: RefCell<Option<Type>>,
    pub number_index: RefCell<Option<Type>>,
}

impl std::fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InterfaceType({})", self.name)
    }
}

impl InterfaceType {
    pub fn shell(name: &str) -> Rc<InterfaceType> {
        Rc::new(InterfaceType {
            name: name.to_string(),
            type_params: RefCell::new(vec![]),
            members: RefCell::new(vec![]),
            extends: RefCell::new(vec![]),
            string_index: RefCell::new(None),
            number_index: RefCell::new(None),
        })
    }

    /// All members, including inherited ones; own members shadow.
    pub fn all_members(self: &Rc<Self>) -> Vec<PropType> {
        let mut members: Vec<PropType> = self.members.borrow().clone();
        for base in self.extends.borrow().iter() {
            for inherited in base.all_members() {
                if !members.iter().any(|m| m.name == inherited.name) {
                    members.push(inherited);
                }
            }
        }
        members
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Boolean => f.write_str("boolean"),
            Type::Symbol => f.write_str("symbol"),
            Type::Null => f.write_str("null"),
            Type::Undefined => f.write_str("undefined"),
            Type::Void => f.write_str("void"),
            Type::Any => f.write_str("any"),
            Type::Never => f.write_str("never"),
            Type::NumberLit(n) => write!(f, "{}", crate::runtime::format_number(*n)),
            Type::StringLit(s) => write!(f, "\"{s}\""),
            Type::BoolLit(b) => write!(f, "{b}"),
            Type::Array(element) => match element.as_ref() {
                Type::Union(_) => write!(f, "({element})[]"),
                other => write!(f, "{other}[]"),
            },
            Type::Tuple(elements) => {
                f.write_str("[")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Type::Union(arms) => {
                for (index, arm) in arms.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{arm}")?;
                }
                Ok(())
            }
            Type::Intersection(arms) => {
                for (index, arm) in arms.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{arm}")?;
                }
                Ok(())
            }
            Type::Object(obj) => {
                f.write_str("{ ")?;
                for (index, prop) in obj.props.iter().enumerate() {
                    if index > 0 {
                        f.write_str("; ")?;
                    }
                    let optional = if prop.optional { "?" } else { "" };
                    write!(f, "{}{optional}: {}", prop.name, prop.ty)?;
                }
                if let Some(index) = &obj.string_index {
                    if !obj.props.is_empty() {
                        f.write_str("; ")?;
                    }
                    write!(f, "[key: string]: {index}")?;
                }
                f.write_str(" }")
            }
            Type::Function(func) => {
                let Some(signature) = func.signatures.first() else {
                    return f.write_str("Function");
                };
                f.write_str("(")?;
                for (index, param) in signature.params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    let rest = if param.rest { "..." } else { "" };
                    let optional = if param.optional { "?" } else { "" };
                    write!(f, "{rest}{}{optional}: {}", param.name, param.ty)?;
                }
                write!(f, ") => {}", signature.ret)
            }
            Type::Class(class, args) => write_named(f, &class.name, args),
            Type::Ctor(class) => write!(f, "typeof {}", class.name),
            Type::Interface(interface, args) => write_named(f, &interface.name, args),
            Type::TypeParam(name) => f.write_str(name),
            Type::KeyOf(operand) => write!(f, "keyof {operand}"),
            Type::IndexAccess(target, index) => write!(f, "{target}[{index}]"),
        }
    }
}

fn write_named(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    args: &[Type],
) -> std::fmt::Result {
    f.write_str(name)?;
    if !args.is_empty() {
        f.write_str("<")?;
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(">")?;
    }
    Ok(())
}
