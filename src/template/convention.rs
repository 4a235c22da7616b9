//! Calling conventions
//!
//! A [`Convention`] declares what a tag accepts: whether a parameter and a
//! body are forbidden, optional or required, whether the body is evaluated
//! before the handler sees it, how parameter and body are decoded, and the
//! two behaviours `redo` and `deferred`.
//!
//! Conventions can be written as flag strings (`"NO_PARAM|REQUIRE_BODY"`),
//! built from [`Flag`] slices, or assembled with the builder methods.
//! Contradictory combinations are rejected by [`Convention::validate`], which
//! the registry runs once per registration.

use crate::template::error::{TemplateError, TemplateResult};
use std::fmt;
use std::str::FromStr;

/// Whether a parameter or body may or must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arity {
    Forbidden,
    #[default]
    Optional,
    Required,
}

/// Whether the body is recursively expanded or passed through as raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    #[default]
    Parsed,
    Raw,
}

/// How the body is decoded before the handler is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyShape {
    #[default]
    Text,
    KeyValue,
    Json,
    List,
    CommaList,
    Xml,
}

impl BodyShape {
    pub fn label(self) -> &'static str {
        match self {
            BodyShape::Text => "text",
            BodyShape::KeyValue => "key-value list",
            BodyShape::Json => "JSON document",
            BodyShape::List => "list",
            BodyShape::CommaList => "comma list",
            BodyShape::Xml => "XML tree",
        }
    }
}

/// How the parameter is decoded before the handler is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamShape {
    #[default]
    Scalar,
    /// Split on the tag separator
    List,
    /// Split on commas
    CommaList,
}

/// The individual convention flags plugins declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    NoParam,
    RequireParam,
    NoBody,
    RequireBody,
    Text,
    Redo,
    OneParam,
    KvBody,
    JsonBody,
    ListBody,
    CsListBody,
    XmlBody,
    ParamList,
    ParamCsList,
    Postprocess,
}

const FLAG_NAMES: &[(Flag, &str)] = &[
    (Flag::NoParam, "NO_PARAM"),
    (Flag::RequireParam, "REQUIRE_PARAM"),
    (Flag::NoBody, "NO_BODY"),
    (Flag::RequireBody, "REQUIRE_BODY"),
    (Flag::Text, "TEXT"),
    (Flag::Redo, "REDO"),
    (Flag::OneParam, "ONE_PARAM"),
    (Flag::KvBody, "KV_BODY"),
    (Flag::JsonBody, "JSON_BODY"),
    (Flag::ListBody, "LIST_BODY"),
    (Flag::CsListBody, "CSLIST_BODY"),
    (Flag::XmlBody, "XML_BODY"),
    (Flag::ParamList, "PARAM_LIST"),
    (Flag::ParamCsList, "PARAM_CSLIST"),
    (Flag::Postprocess, "POSTPROCESS"),
];

impl Flag {
    pub fn name(self) -> &'static str {
        FLAG_NAMES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map_or("", |(_, name)| name)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flag {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FLAG_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(wanted))
            .map(|(flag, _)| *flag)
            .ok_or_else(|| invalid(format!("unknown flag '{}'", wanted)))
    }
}

/// Declared shape and behaviour of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Convention {
    pub param: Arity,
    pub body: Arity,
    pub body_mode: BodyMode,
    pub body_shape: BodyShape,
    pub param_shape: ParamShape,
    /// An empty parameter is taken from the body instead
    pub one_param: bool,
    /// The handler output is expanded again as template text
    pub redo: bool,
    /// The handler runs once after the whole document is expanded
    pub deferred: bool,
}

impl Convention {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_param(mut self) -> Self {
        self.param = Arity::Forbidden;
        self
    }

    pub fn require_param(mut self) -> Self {
        self.param = Arity::Required;
        self
    }

    pub fn no_body(mut self) -> Self {
        self.body = Arity::Forbidden;
        self
    }

    pub fn require_body(mut self) -> Self {
        self.body = Arity::Required;
        self
    }

    /// Keep the body as raw text instead of expanding it first.
    pub fn text(mut self) -> Self {
        self.body_mode = BodyMode::Raw;
        self
    }

    pub fn redo(mut self) -> Self {
        self.redo = true;
        self
    }

    pub fn one_param(mut self) -> Self {
        self.one_param = true;
        self
    }

    pub fn postprocess(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn body_shape(mut self, shape: BodyShape) -> Self {
        self.body_shape = shape;
        self
    }

    pub fn param_shape(mut self, shape: ParamShape) -> Self {
        self.param_shape = shape;
        self
    }

    /// Build a convention from flags. Setting the same aspect twice with
    /// different values is an error.
    pub fn from_flags(flags: &[Flag]) -> TemplateResult<Self> {
        let mut convention = Convention::default();
        let mut param_set = false;
        let mut body_set = false;
        let mut body_shape_set = false;
        let mut param_shape_set = false;

        for flag in flags {
            match flag {
                Flag::NoParam | Flag::RequireParam => {
                    let arity = if *flag == Flag::NoParam {
                        Arity::Forbidden
                    } else {
                        Arity::Required
                    };
                    if param_set && convention.param != arity {
                        return Err(invalid("NO_PARAM and REQUIRE_PARAM are exclusive"));
                    }
                    convention.param = arity;
                    param_set = true;
                }
                Flag::NoBody | Flag::RequireBody => {
                    let arity = if *flag == Flag::NoBody {
                        Arity::Forbidden
                    } else {
                        Arity::Required
                    };
                    if body_set && convention.body != arity {
                        return Err(invalid("NO_BODY and REQUIRE_BODY are exclusive"));
                    }
                    convention.body = arity;
                    body_set = true;
                }
                Flag::Text => convention.body_mode = BodyMode::Raw,
                Flag::Redo => convention.redo = true,
                Flag::OneParam => convention.one_param = true,
                Flag::Postprocess => convention.deferred = true,
                Flag::KvBody
                | Flag::JsonBody
                | Flag::ListBody
                | Flag::CsListBody
                | Flag::XmlBody => {
                    let shape = match flag {
                        Flag::KvBody => BodyShape::KeyValue,
                        Flag::JsonBody => BodyShape::Json,
                        Flag::ListBody => BodyShape::List,
                        Flag::CsListBody => BodyShape::CommaList,
                        _ => BodyShape::Xml,
                    };
                    if body_shape_set && convention.body_shape != shape {
                        return Err(invalid("only one body shape flag may be set"));
                    }
                    convention.body_shape = shape;
                    body_shape_set = true;
                }
                Flag::ParamList | Flag::ParamCsList => {
                    let shape = if *flag == Flag::ParamList {
                        ParamShape::List
                    } else {
                        ParamShape::CommaList
                    };
                    if param_shape_set && convention.param_shape != shape {
                        return Err(invalid("PARAM_LIST and PARAM_CSLIST are exclusive"));
                    }
                    convention.param_shape = shape;
                    param_shape_set = true;
                }
            }
        }

        convention.validate().map_err(invalid)?;
        Ok(convention)
    }

    /// Check for combinations that can never be satisfied.
    pub fn validate(&self) -> Result<(), String> {
        if self.body == Arity::Forbidden {
            if self.body_shape != BodyShape::Text {
                return Err(format!(
                    "a {} body shape needs a body",
                    self.body_shape.label()
                ));
            }
            if self.body_mode == BodyMode::Raw {
                return Err("raw text body mode needs a body".to_string());
            }
        }
        if self.param == Arity::Forbidden && self.param_shape != ParamShape::Scalar {
            return Err("parameter decoding needs a parameter".to_string());
        }
        if self.one_param {
            if self.param == Arity::Forbidden || self.body == Arity::Forbidden {
                return Err("ONE_PARAM needs both a parameter and a body slot".to_string());
            }
            if self.body == Arity::Required {
                return Err("ONE_PARAM takes the body as parameter; it cannot be required".to_string());
            }
            if self.body_shape != BodyShape::Text {
                return Err("ONE_PARAM bodies cannot be decoded".to_string());
            }
        }
        Ok(())
    }

    /// The flags describing this convention.
    pub fn flags(&self) -> Vec<Flag> {
        let mut flags = Vec::new();
        match self.param {
            Arity::Forbidden => flags.push(Flag::NoParam),
            Arity::Required => flags.push(Flag::RequireParam),
            Arity::Optional => {}
        }
        match self.body {
            Arity::Forbidden => flags.push(Flag::NoBody),
            Arity::Required => flags.push(Flag::RequireBody),
            Arity::Optional => {}
        }
        if self.body_mode == BodyMode::Raw {
            flags.push(Flag::Text);
        }
        if self.redo {
            flags.push(Flag::Redo);
        }
        if self.one_param {
            flags.push(Flag::OneParam);
        }
        match self.body_shape {
            BodyShape::Text => {}
            BodyShape::KeyValue => flags.push(Flag::KvBody),
            BodyShape::Json => flags.push(Flag::JsonBody),
            BodyShape::List => flags.push(Flag::ListBody),
            BodyShape::CommaList => flags.push(Flag::CsListBody),
            BodyShape::Xml => flags.push(Flag::XmlBody),
        }
        match self.param_shape {
            ParamShape::Scalar => {}
            ParamShape::List => flags.push(Flag::ParamList),
            ParamShape::CommaList => flags.push(Flag::ParamCsList),
        }
        if self.deferred {
            flags.push(Flag::Postprocess);
        }
        flags
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.flags().into_iter().map(Flag::name).collect();
        if names.is_empty() {
            f.write_str("DEFAULT")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl FromStr for Convention {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flags = s
            .split('|')
            .map(str::trim)
            .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case("DEFAULT"))
            .map(Flag::from_str)
            .collect::<TemplateResult<Vec<_>>>()?;
        Convention::from_flags(&flags)
    }
}

fn invalid(message: impl Into<String>) -> TemplateError {
    TemplateError::InvalidConvention {
        tag: String::new(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_permissive() {
        let convention = Convention::default();
        assert_eq!(convention.param, Arity::Optional);
        assert_eq!(convention.body, Arity::Optional);
        assert_eq!(convention.body_mode, BodyMode::Parsed);
        assert_eq!(convention.to_string(), "DEFAULT");
    }

    #[test]
    fn test_parse_flag_string() {
        let convention: Convention = "NO_PARAM | REQUIRE_BODY | TEXT".parse().unwrap();
        assert_eq!(convention.param, Arity::Forbidden);
        assert_eq!(convention.body, Arity::Required);
        assert_eq!(convention.body_mode, BodyMode::Raw);
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        let convention = Convention::new()
            .require_param()
            .require_body()
            .body_shape(BodyShape::Json)
            .param_shape(ParamShape::CommaList)
            .redo()
            .postprocess();
        let text = convention.to_string();
        assert_eq!(text, "REQUIRE_PARAM|REQUIRE_BODY|REDO|JSON_BODY|PARAM_CSLIST|POSTPROCESS");
        assert_eq!(text.parse::<Convention>().unwrap(), convention);
    }

    #[test]
    fn test_unknown_flag() {
        let err = "NO_PARAM|SHINY".parse::<Convention>().unwrap_err();
        assert!(err.to_string().contains("SHINY"));
    }

    #[test]
    fn test_conflicting_arity_flags() {
        assert!(Convention::from_flags(&[Flag::NoParam, Flag::RequireParam]).is_err());
        assert!(Convention::from_flags(&[Flag::NoBody, Flag::RequireBody]).is_err());
    }

    #[test]
    fn test_two_body_shapes() {
        assert!(Convention::from_flags(&[Flag::KvBody, Flag::JsonBody]).is_err());
    }

    #[test]
    fn test_body_shape_without_body() {
        assert!(Convention::from_flags(&[Flag::NoBody, Flag::XmlBody]).is_err());
        assert!(Convention::new().no_body().text().validate().is_err());
    }

    #[test]
    fn test_param_shape_without_param() {
        assert!(Convention::from_flags(&[Flag::NoParam, Flag::ParamList]).is_err());
    }

    #[test]
    fn test_one_param_rules() {
        assert!(Convention::new().one_param().validate().is_ok());
        assert!(Convention::new().one_param().require_body().validate().is_err());
        assert!(Convention::new().one_param().no_param().validate().is_err());
    }
}
