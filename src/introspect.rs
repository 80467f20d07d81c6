//! Metadata calls reachable by name from `!metadata`, `!dbinfo` and the
//! table shortcuts.

use crate::backend::{Isolation, Metadata};
use crate::error::ShellError;
use crate::reflector::{MethodSpec, ParamType, Reflect, Value};

/// Zero-argument capability queries printed by `!dbinfo`, in order.
pub const DBINFO_METHODS: &[&str] = &[
    "getURL",
    "getDatabaseProductName",
    "getDatabaseProductVersion",
    "getDriverName",
    "getDriverVersion",
    "getUserName",
    "getIdentifierQuoteString",
    "isReadOnly",
    "supportsTransactions",
    "getDefaultTransactionIsolation",
    "getSQLKeywords",
    "getNumericFunctions",
    "getStringFunctions",
    "getSystemFunctions",
    "getTimeDateFunctions",
];

fn pattern(args: &[Value], index: usize) -> Option<&str> {
    args.get(index).and_then(Value::as_str)
}

fn required<'v>(args: &'v [Value], what: &str) -> Result<&'v str, ShellError> {
    pattern(args, 0).ok_or_else(|| ShellError::UserInput(format!("A {what} is required")))
}

impl<'a> Reflect for dyn Metadata + 'a {
    fn methods() -> Vec<MethodSpec<Self>> {
        use ParamType::{Int, Str, TypeName};
        vec![
            MethodSpec::new("getURL", &[], |m, _| Ok(Value::Str(m.url()))),
            MethodSpec::new("getDatabaseProductName", &[], |m, _| {
                Ok(Value::Str(m.database_product_name()?))
            }),
            MethodSpec::new("getDatabaseProductVersion", &[], |m, _| {
                Ok(Value::Str(m.database_product_version()?))
            }),
            MethodSpec::new("getDriverName", &[], |m, _| Ok(Value::Str(m.driver_name()))),
            MethodSpec::new("getDriverVersion", &[], |m, _| {
                Ok(Value::Str(m.driver_version()))
            }),
            MethodSpec::new("getUserName", &[], |m, _| Ok(Value::Str(m.user_name()?))),
            MethodSpec::new("getIdentifierQuoteString", &[], |m, _| {
                Ok(Value::Str(m.identifier_quote_string()))
            }),
            MethodSpec::new("getSQLKeywords", &[], |m, _| Ok(Value::Str(m.sql_keywords()?))),
            MethodSpec::new("getNumericFunctions", &[], |m, _| {
                Ok(Value::Str(m.numeric_functions()?))
            }),
            MethodSpec::new("getStringFunctions", &[], |m, _| {
                Ok(Value::Str(m.string_functions()?))
            }),
            MethodSpec::new("getSystemFunctions", &[], |m, _| {
                Ok(Value::Str(m.system_functions()?))
            }),
            MethodSpec::new("getTimeDateFunctions", &[], |m, _| {
                Ok(Value::Str(m.time_date_functions()?))
            }),
            MethodSpec::new("isReadOnly", &[], |m, _| Ok(Value::Bool(m.is_read_only()?))),
            MethodSpec::new("supportsTransactions", &[], |m, _| {
                Ok(Value::Bool(m.supports_transactions()))
            }),
            MethodSpec::new("getDefaultTransactionIsolation", &[], |m, _| {
                Ok(Value::Int(m.default_transaction_isolation().code()))
            }),
            MethodSpec::new("supportsTransactionIsolationLevel", &[Int], |m, a| {
                let level = a
                    .first()
                    .and_then(Value::as_i64)
                    .and_then(|code| i32::try_from(code).ok())
                    .and_then(Isolation::from_code);
                Ok(Value::Bool(
                    level.is_some_and(|l| m.supports_transaction_isolation_level(l)),
                ))
            }),
            MethodSpec::new("getTables", &[], |m, _| Ok(Value::Cursor(m.tables(None)?))),
            MethodSpec::new("getTables", &[Str], |m, a| {
                Ok(Value::Cursor(m.tables(pattern(&a, 0))?))
            }),
            MethodSpec::new("getColumns", &[Str], |m, a| {
                Ok(Value::Cursor(m.columns(pattern(&a, 0), None)?))
            }),
            MethodSpec::new("getColumns", &[Str, Str], |m, a| {
                Ok(Value::Cursor(m.columns(pattern(&a, 0), pattern(&a, 1))?))
            }),
            MethodSpec::new("getPrimaryKeys", &[Str], |m, a| {
                Ok(Value::Cursor(m.primary_keys(required(&a, "table name")?)?))
            }),
            MethodSpec::new("getSchemas", &[], |m, _| Ok(Value::Cursor(m.schemas()?))),
            MethodSpec::new("isWrapperFor", &[TypeName], |m, a| {
                let kind = m.kind();
                Ok(Value::Bool(matches!(a.first(), Some(Value::Type(k)) if *k == kind)))
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockDriver, SharedState, shared};
    use crate::backend::{Connection, Driver, column_values};
    use crate::reflector::{InvokeError, invoke, signatures};
    use rstest::{fixture, rstest};

    #[fixture]
    fn state() -> SharedState {
        let state = shared();
        state.borrow_mut().tables = vec![
            ("users".to_string(), vec!["id".to_string(), "name".to_string()]),
            ("orders".to_string(), vec!["id".to_string()]),
        ];
        state.borrow_mut().primary_keys = vec![("users".to_string(), vec!["id".to_string()])];
        state
    }

    fn metadata(state: &SharedState) -> Box<dyn Metadata> {
        let mut connection = MockDriver::new(state.clone()).connect("mock:db", "", "").unwrap();
        connection.metadata().unwrap()
    }

    fn args(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[rstest]
    fn test_every_dbinfo_method_resolves(state: SharedState) {
        let mut meta = metadata(&state);
        for name in DBINFO_METHODS {
            let value = invoke(meta.as_mut(), name, &[]).unwrap();
            assert!(!matches!(value, Value::Cursor(_)), "{name}");
        }
        let value = invoke(meta.as_mut(), "getdatabaseproductname", &[]).unwrap();
        assert_eq!(value.as_str(), Some("MockDB"));
    }

    #[rstest]
    fn test_overloads_pick_by_arity(state: SharedState) {
        let mut meta = metadata(&state);
        let Value::Cursor(mut all) = invoke(meta.as_mut(), "getTables", &[]).unwrap() else {
            panic!("expected a cursor");
        };
        assert_eq!(column_values(all.as_mut(), "TABLE_NAME").unwrap(), vec!["users", "orders"]);

        let Value::Cursor(mut some) =
            invoke(meta.as_mut(), "getColumns", &args(&["users", "NAME"])).unwrap()
        else {
            panic!("expected a cursor");
        };
        assert_eq!(column_values(some.as_mut(), "COLUMN_NAME").unwrap(), vec!["name"]);
    }

    #[rstest]
    fn test_null_pattern_means_any(state: SharedState) {
        let mut meta = metadata(&state);
        let Value::Cursor(mut cursor) = invoke(meta.as_mut(), "getTables", &args(&["null"])).unwrap()
        else {
            panic!("expected a cursor");
        };
        assert_eq!(column_values(cursor.as_mut(), "TABLE_NAME").unwrap().len(), 2);
    }

    #[rstest]
    fn test_primary_keys_need_a_table(state: SharedState) {
        let mut meta = metadata(&state);
        assert!(invoke(meta.as_mut(), "getPrimaryKeys", &[None]).is_err());
        let Value::Cursor(mut cursor) =
            invoke(meta.as_mut(), "getPrimaryKeys", &args(&["users"])).unwrap()
        else {
            panic!("expected a cursor");
        };
        assert_eq!(column_values(cursor.as_mut(), "COLUMN_NAME").unwrap(), vec!["id"]);
    }

    #[rstest]
    #[case("2", true)]
    #[case("0", false)]
    #[case("3", false)]
    fn test_isolation_support_by_code(state: SharedState, #[case] code: &str, #[case] expected: bool) {
        let mut meta = metadata(&state);
        let value = invoke(meta.as_mut(), "supportsTransactionIsolationLevel", &args(&[code]));
        assert_eq!(value.unwrap().as_bool(), Some(expected));
    }

    #[rstest]
    fn test_is_wrapper_for_type_name(state: SharedState) {
        let mut meta = metadata(&state);
        let yes = invoke(meta.as_mut(), "isWrapperFor", &args(&["sqlite"])).unwrap();
        let no = invoke(meta.as_mut(), "isWrapperFor", &args(&["mysql"])).unwrap();
        assert_eq!(yes.as_bool(), Some(true));
        assert_eq!(no.as_bool(), Some(false));
        assert!(matches!(
            invoke(meta.as_mut(), "isWrapperFor", &args(&["oracle"])),
            Err(ShellError::Reflection(InvokeError::ArgumentConversion { .. }))
        ));
    }

    #[rstest]
    fn test_signatures_list_overloads() {
        let sigs = signatures::<dyn Metadata>();
        assert!(sigs.contains(&"getColumns(String, String)".to_string()));
        assert!(sigs.contains(&"isWrapperFor(Type)".to_string()));
    }
}
