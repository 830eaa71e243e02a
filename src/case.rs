//! Name matching for fields and methods: "FirstName", "firstName" and "first_name" are the same name.

/// Comparison key for an identifier: lowercase, underscores dropped.
/// e.g. "FirstName" -> "firstname", "first_name" -> "firstname"
pub fn field_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c != '_' {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Whether two identifiers name the same field, ignoring case and snake/camel style.
pub fn same_name(a: &str, b: &str) -> bool {
    a == b || field_key(a) == field_key(b)
}

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
