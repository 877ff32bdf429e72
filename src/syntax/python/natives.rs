//! Names the host sandbox makes available.
//!
//! The sandbox only admits imports from a fixed set of standard modules, and only
//! specific names from each. Anything else must come from a fragment or the host API.

use crate::syntax::NativeModule;

const ALLOWED_NATIVES: &[(&str, NativeModule)] = &[
    ("calendar", NativeModule::Members(&["isleap", "monthrange"])),
    ("collections", NativeModule::Members(&["defaultdict"])),
    ("datetime", NativeModule::Members(&["datetime"])),
    ("dateutil.parser", NativeModule::Members(&["parse"])),
    ("dateutil.relativedelta", NativeModule::Members(&["relativedelta"])),
    (
        "decimal",
        NativeModule::Members(&[
            "Decimal",
            "ROUND_05UP",
            "ROUND_CEILING",
            "ROUND_DOWN",
            "ROUND_FLOOR",
            "ROUND_HALF_DOWN",
            "ROUND_HALF_EVEN",
            "ROUND_HALF_UP",
        ]),
    ),
    ("json", NativeModule::Members(&["dumps", "loads"])),
    ("math", NativeModule::WholeModule),
    (
        "typing",
        NativeModule::Members(&[
            "Any",
            "Callable",
            "DefaultDict",
            "Dict",
            "Iterable",
            "Iterator",
            "List",
            "Mapping",
            "NamedTuple",
            "NewType",
            "NoReturn",
            "Optional",
            "Set",
            "Type",
            "Tuple",
            "Union",
        ]),
    ),
    ("zoneinfo", NativeModule::Members(&["ZoneInfo"])),
];

const BUILTINS: &[&str] = &[
    "ArithmeticError", "AssertionError", "AttributeError", "Exception", "False", "IndexError",
    "KeyError", "LookupError", "NameError", "None", "NotImplemented", "NotImplementedError",
    "OverflowError", "RuntimeError", "StopIteration", "True", "TypeError", "ValueError",
    "ZeroDivisionError", "__name__", "abs", "all", "any", "bool", "callable", "chr", "classmethod",
    "dict", "divmod", "enumerate", "filter", "float", "frozenset", "getattr", "hasattr", "hash",
    "int", "isinstance", "issubclass", "iter", "len", "list", "map", "max", "min", "next",
    "object", "ord", "pow", "print", "property", "range", "repr", "reversed", "round", "set",
    "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "zip",
];

pub(crate) fn native_module(module: &str) -> Option<NativeModule> {
    ALLOWED_NATIVES.iter().find(|(name, _)| *name == module).map(|(_, allowed)| *allowed)
}

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(native_module("math"), Some(NativeModule::WholeModule));
        assert!(matches!(
            native_module("decimal"),
            Some(NativeModule::Members(names)) if names.contains(&"ROUND_HALF_UP")
        ));
        assert_eq!(native_module("os"), None);
        assert!(is_builtin("len"));
        assert!(!is_builtin("open"));
    }
}
