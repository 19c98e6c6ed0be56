//! Column mapping macros
//!
//! Closed enumerations are stored as lowercase TEXT. Any type passed to
//! `sql_text_enum!` must provide `as_str(&self) -> &'static str` and
//! `parse(&str) -> Option<Self>`.

/// Implement `ToSql`, `FromSql` and `Into<Value>` for a TEXT-backed enum.
/// Unknown stored values fail the read instead of silently defaulting.
macro_rules! sql_text_enum {
    ($ty:ident) => {
        impl ::rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> ::rusqlite::Result<::rusqlite::types::ToSqlOutput<'_>> {
                Ok(::rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl ::rusqlite::types::FromSql for $ty {
            fn column_result(
                value: ::rusqlite::types::ValueRef<'_>,
            ) -> ::rusqlite::types::FromSqlResult<Self> {
                let raw = value.as_str()?;
                $ty::parse(raw).ok_or_else(|| {
                    ::rusqlite::types::FromSqlError::Other(
                        format!("unknown {} value: {}", stringify!($ty), raw).into(),
                    )
                })
            }
        }

        impl From<$ty> for ::rusqlite::types::Value {
            fn from(value: $ty) -> Self {
                ::rusqlite::types::Value::Text(value.as_str().to_string())
            }
        }
    };
}
