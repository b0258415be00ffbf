//! Target identifiers from free-form field and table names

use crate::options::{NamingConvention, Target};
use ahash::AHashSet;
use heck::{ToLowerCamelCase, ToSnakeCase};
use once_cell::sync::Lazy;

static PYTHON_RESERVED: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
        "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
        "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
        "try", "while", "with", "yield", "match", "case", "math", "datetime", "record", "data",
    ]
    .into_iter()
    .collect()
});

static JAVASCRIPT_RESERVED: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
        "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
        "null", "package", "private", "protected", "public", "return", "static", "super",
        "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
        "with", "yield", "record", "data",
    ]
    .into_iter()
    .collect()
});

static SQL_RESERVED: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "any", "as", "asc", "between", "by", "case", "cast", "check", "column",
        "constraint", "create", "cross", "default", "delete", "desc", "distinct", "drop", "else",
        "end", "except", "exists", "false", "for", "foreign", "from", "full", "group", "having",
        "id", "in", "index", "inner", "insert", "intersect", "into", "is", "join", "key", "left",
        "like", "limit", "not", "null", "offset", "on", "or", "order", "outer", "primary",
        "references", "right", "select", "set", "table", "then", "to", "true", "union",
        "unique", "update", "user", "using", "values", "view", "when", "where", "with",
    ]
    .into_iter()
    .collect()
});

/// Case an identifier is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Snake,
    Camel,
}

impl Case {
    /// Resolve a naming convention for a target
    pub fn resolve(naming: NamingConvention, target: Target) -> Case {
        match (naming, target) {
            (NamingConvention::SnakeCase, _) => Case::Snake,
            (NamingConvention::CamelCase, _) => Case::Camel,
            (NamingConvention::TargetDefault, Target::JavaScript) => Case::Camel,
            (NamingConvention::TargetDefault, Target::Python | Target::Sql) => Case::Snake,
        }
    }
}

/// Whether a word is reserved in the target
pub fn is_reserved(target: Target, word: &str) -> bool {
    match target {
        Target::Python => PYTHON_RESERVED.contains(word),
        Target::JavaScript => JAVASCRIPT_RESERVED.contains(word),
        Target::Sql => SQL_RESERVED.contains(word.to_ascii_lowercase().as_str()),
    }
}

/// Convert free text into an identifier: ASCII letters, digits and underscores, never starting
/// with a digit, never empty
pub fn sanitize(text: &str, case: Case) -> String {
    let converted = match case {
        Case::Snake => text.to_snake_case(),
        Case::Camel => text.to_lower_camel_case(),
    };
    let mut ident: String = converted
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if ident.is_empty() {
        ident.push_str("field");
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        let prefix = match case {
            Case::Snake => "f_",
            Case::Camel => "f",
        };
        ident.insert_str(0, prefix);
    }
    ident
}

/// Hands out unique identifiers within one namespace
#[derive(Debug, Clone)]
pub struct IdentAllocator {
    target: Target,
    case: Case,
    used: AHashSet<String>,
}

impl IdentAllocator {
    pub fn new(target: Target, naming: NamingConvention) -> Self {
        Self {
            target,
            case: Case::resolve(naming, target),
            used: AHashSet::new(),
        }
    }

    /// Mark a name as taken without allocating it
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(fold(self.target, name));
    }

    /// Allocate a unique identifier built from the given name parts
    pub fn allocate(&mut self, parts: &[&str]) -> String {
        let mut base = sanitize(&parts.join(" "), self.case);
        if is_reserved(self.target, &base) {
            base.push('_');
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while self.used.contains(&fold(self.target, &candidate)) {
            candidate = match self.case {
                Case::Snake => format!("{base}_{n}"),
                Case::Camel => format!("{base}{n}"),
            };
            n += 1;
        }
        self.used.insert(fold(self.target, &candidate));
        candidate
    }
}

/// SQL identifiers collide case-insensitively
fn fold(target: Target, name: &str) -> String {
    match target {
        Target::Sql => name.to_ascii_lowercase(),
        Target::Python | Target::JavaScript => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_cases() {
        assert_eq!(sanitize("get Orders Total ($)", Case::Snake), "get_orders_total");
        assert_eq!(sanitize("get Orders Total ($)", Case::Camel), "getOrdersTotal");
        assert_eq!(sanitize("2024 Sales", Case::Snake), "f_2024_sales");
        assert_eq!(sanitize("2024 Sales", Case::Camel), "f2024Sales");
        assert_eq!(sanitize("%%", Case::Snake), "field");
    }

    #[test]
    fn test_allocator_suffixes_collisions() {
        let mut idents = IdentAllocator::new(Target::Python, NamingConvention::TargetDefault);
        assert_eq!(idents.allocate(&["get", "Orders", "Total"]), "get_orders_total");
        assert_eq!(idents.allocate(&["get", "Orders", "total"]), "get_orders_total_2");
        assert_eq!(idents.allocate(&["get", "orders", "TOTAL!"]), "get_orders_total_3");

        let mut idents = IdentAllocator::new(Target::JavaScript, NamingConvention::TargetDefault);
        assert_eq!(idents.allocate(&["get", "A", "B"]), "getAB");
        assert_eq!(idents.allocate(&["get", "a", "b"]), "getAB2");
    }

    #[test]
    fn test_reserved_words_are_escaped() {
        let mut idents = IdentAllocator::new(Target::Python, NamingConvention::TargetDefault);
        assert_eq!(idents.allocate(&["class"]), "class_");

        let mut columns = IdentAllocator::new(Target::Sql, NamingConvention::TargetDefault);
        columns.reserve("Total");
        assert_eq!(columns.allocate(&["Order"]), "order_");
        assert_eq!(columns.allocate(&["total"]), "total_2");
    }
}
