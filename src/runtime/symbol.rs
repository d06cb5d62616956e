use std::cell::Cell;
use std::rc::Rc;

/// A symbol value: identity-only, with an optional description. Two calls
/// to `Symbol("x")` yield distinct values; equality is `Rc` identity.
#[derive(Debug)]
pub struct SymbolValue {
    pub id: usize,
    pub description: Option<String>,
}

impl SymbolValue {
    pub fn to_display(&self) -> String {
        match &self.description {
            Some(description) => format!("Symbol({description})"),
            None => "Symbol()".to_string(),
        }
    }
}

thread_local! {
    static NEXT_SYMBOL_ID: Cell<usize> = const { Cell::new(1) };
    static WELL_KNOWN: WellKnownSymbols = WellKnownSymbols::intern();
}

pub fn new_symbol(description: Option<String>) -> Rc<SymbolValue> {
    let id = NEXT_SYMBOL_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    Rc::new(SymbolValue { id, description })
}

/// The process-wide well-known symbols, interned before any user code runs.
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    pub iterator: Rc<SymbolValue>,
    pub async_iterator: Rc<SymbolValue>,
    pub to_string_tag: Rc<SymbolValue>,
    pub has_instance: Rc<SymbolValue>,
    pub to_primitive: Rc<SymbolValue>,
}

impl WellKnownSymbols {
    fn intern() -> Self {
        WellKnownSymbols {
            iterator: new_symbol(Some("Symbol.iterator".into())),
            async_iterator: new_symbol(Some("Symbol.asyncIterator".into())),
            to_string_tag: new_symbol(Some("Symbol.toStringTag".into())),
            has_instance: new_symbol(Some("Symbol.hasInstance".into())),
            to_primitive: new_symbol(Some("Symbol.toPrimitive".into())),
        }
    }
}

pub fn well_known() -> WellKnownSymbols {
    WELL_KNOWN.with(|symbols| symbols.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_identity_only() {
        let a = new_symbol(Some("x".into()));
        let b = new_symbol(Some("x".into()));
        assert!(!Rc::ptr_eq(&a, &b));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_well_known_symbols_are_interned() {
        let first = well_known().iterator;
        let second = well_known().iterator;
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_symbol_display() {
        assert_eq!(new_symbol(Some("x".into())).to_display(), "Symbol(x)");
        assert_eq!(new_symbol(None).to_display(), "Symbol()");
    }
}
