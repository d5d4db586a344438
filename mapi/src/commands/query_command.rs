//! Query serialization: `prefix + body + suffix`, language-specific.

/// The session language, which selects the `(prefix, suffix)` template a
/// query body is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Sql,
    Mal,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Sql => "sql",
            Language::Mal => "mal",
        }
    }

    fn query_template(self) -> (&'static str, &'static str) {
        match self {
            Language::Sql => ("s", "\n;"),
            Language::Mal => ("", "\n"),
        }
    }
}

/// A query ready to be written to the wire as `prefix + body + suffix`.
pub struct QueryCommand {
    pub prefix: &'static str,
    pub body: String,
    pub suffix: &'static str,
}

impl QueryCommand {
    pub fn new(language: Language, body: impl Into<String>) -> QueryCommand {
        let (prefix, suffix) = language.query_template();
        QueryCommand {
            prefix,
            body: body.into(),
            suffix,
        }
    }

    pub fn to_wire(&self) -> String {
        format!("{}{}{}", self.prefix, self.body, self.suffix)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sql_query_gets_s_prefix_and_semicolon_suffix() {
        let cmd = QueryCommand::new(Language::Sql, "select 1");
        assert_eq!(cmd.to_wire(), "sselect 1\n;");
    }

    #[test]
    fn mal_query_has_no_prefix() {
        let cmd = QueryCommand::new(Language::Mal, "io.print(1);");
        assert_eq!(cmd.to_wire(), "io.print(1);\n");
    }
}
