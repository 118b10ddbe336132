//! Responses of a debugger engine.
//!
//! The XML payload is parsed on first access and cached together with the
//! namespace of its root element. Engine reported errors are classified when
//! a response is created, so holding a [`Response`] means the command succeeded.

use crate::error::{Error, Result};
use crate::language::Language;
use crate::property::{decode_base64, Naming, Property, PropertyTree};
use once_cell::unsync::OnceCell;
use ouroboros::self_referencing;
use roxmltree::Node;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Separator between eval options and the base64 encoded expression.
pub(crate) const EVAL_SEPARATOR: &str = "-- ";

const FEATURE_NOT_SUPPORTED: &str = "* Feature not supported *";

/// Kind of a response, selected by the name of the command that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResponseKind {
    Generic,
    Status,
    Feature,
    BreakpointSet,
    Stack,
    Context,
    ContextNames,
    Eval,
}

impl ResponseKind {
    pub fn for_command(command: &str) -> Self {
        match command {
            "status" | "run" | "step_into" | "step_over" | "step_out" | "stop" | "detach" => {
                ResponseKind::Status
            }
            "feature_get" => ResponseKind::Feature,
            "breakpoint_set" => ResponseKind::BreakpointSet,
            "stack_get" => ResponseKind::Stack,
            "context_get" | "property_get" => ResponseKind::Context,
            "context_names" => ResponseKind::ContextNames,
            "eval" => ResponseKind::Eval,
            _ => ResponseKind::Generic,
        }
    }
}

#[self_referencing]
struct ParsedXml {
    text: String,
    #[borrows(text)]
    #[not_covariant]
    doc: roxmltree::Document<'this>,
}

/// Single stack frame from a `stack_get` response.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StackFrame {
    pub level: u32,
    /// Frame type, `file` or `eval`.
    pub ty: String,
    pub filename: String,
    pub lineno: u32,
    /// Function or method name.
    pub location: Option<String>,
    pub cmd_begin: Option<String>,
    pub cmd_end: Option<String>,
}

/// Response to a single command.
pub struct Response {
    payload: String,
    command: String,
    args: String,
    kind: ResponseKind,
    language: Language,
    xml: OnceCell<ParsedXml>,
    ns: OnceCell<String>,
}

impl Response {
    /// Wrap a raw payload. Fails if the payload carries an engine error.
    pub fn new(
        payload: String,
        command: impl Into<String>,
        args: impl Into<String>,
        kind: ResponseKind,
        language: Language,
    ) -> Result<Self> {
        let response = Self {
            payload,
            command: command.into(),
            args: args.into(),
            kind,
            language,
            xml: OnceCell::new(),
            ns: OnceCell::new(),
        };
        if response.payload.contains("<error") {
            response.check_error()?;
        }
        Ok(response)
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Name of the command which produced this response.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Command arguments, without the transaction id.
    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Raw XML payload.
    pub fn as_str(&self) -> &str {
        &self.payload
    }

    fn format_error(&self, message: impl Into<String>) -> Error {
        Error::response_format(message, self.payload.as_str())
    }

    fn parsed(&self) -> Result<&ParsedXml> {
        self.xml.get_or_try_init(|| {
            let xml = ParsedXml::try_new(self.payload.clone(), |text| {
                roxmltree::Document::parse(text)
            })?;
            let ns = xml.with_doc(|doc| {
                doc.root_element()
                    .tag_name()
                    .namespace()
                    .map(str::to_string)
            });
            let ns = ns.ok_or_else(|| self.format_error("invalid or missing xml namespace"))?;
            _ = self.ns.set(ns);
            Ok(xml)
        })
    }

    /// Namespace of the root element, child elements are looked up in it.
    pub fn namespace(&self) -> Result<&str> {
        self.parsed()?;
        self.ns
            .get()
            .map(String::as_str)
            .ok_or_else(|| self.format_error("invalid or missing xml namespace"))
    }

    /// Run `f` over the root element of the parsed payload and its namespace.
    pub fn with_xml<R>(&self, f: impl FnOnce(Node<'_, '_>, &str) -> R) -> Result<R> {
        let ns = self.namespace()?;
        Ok(self.parsed()?.with_doc(|doc| f(doc.root_element(), ns)))
    }

    fn root_attribute(&self, name: &str) -> Result<Option<String>> {
        self.with_xml(|root, _| root.attribute(name).map(str::to_string))
    }

    fn required_attribute(&self, name: &str) -> Result<String> {
        self.root_attribute(name)?
            .ok_or_else(|| self.format_error(format!("missing \"{name}\" attribute")))
    }

    fn check_error(&self) -> Result<()> {
        let from_eval = self.kind == ResponseKind::Eval;
        self.with_xml(|root, ns| {
            let Some(error) = root
                .children()
                .find(|n| n.is_element() && n.has_tag_name((ns, "error")))
            else {
                return Err(self.format_error("could not find error element"));
            };
            let Some(code) = error.attribute("code") else {
                return Err(self.format_error("missing error code"));
            };
            let code: i32 = code
                .trim()
                .parse()
                .map_err(|e| self.format_error(format!("invalid error code \"{code}\": {e}")))?;
            let message = error
                .children()
                .find(|n| n.is_element() && n.has_tag_name((ns, "message")))
                .and_then(|m| m.text())
                .map(|text| text.trim().to_string());
            Err(Error::reported(code, message, from_eval))
        })?
    }

    /// Engine status, like `starting`, `break` or `stopping`.
    pub fn status(&self) -> Result<String> {
        self.required_attribute("status")
    }

    /// Reason of the last status change, like `ok` or `exception`.
    pub fn reason(&self) -> Result<Option<String>> {
        self.root_attribute("reason")
    }

    /// True if the engine supports the requested feature.
    pub fn is_supported(&self) -> Result<bool> {
        let supported = self.root_attribute("supported")?;
        Ok(match supported.as_deref().map(str::trim) {
            None => false,
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) => v.parse::<i64>().map(|n| n != 0).unwrap_or(false),
        })
    }

    /// Feature value (`feature_get`), empty if the feature has no value.
    pub fn feature_value(&self) -> Result<String> {
        self.with_xml(|root, _| root.text().unwrap_or_default().to_string())
    }

    /// Id of a created breakpoint (`breakpoint_set`).
    pub fn breakpoint_id(&self) -> Result<u64> {
        let id = self.required_attribute("id")?;
        id.trim()
            .parse()
            .map_err(|e| self.format_error(format!("invalid breakpoint id \"{id}\": {e}")))
    }

    /// Stack frames, innermost first.
    pub fn stack(&self) -> Result<Vec<StackFrame>> {
        self.with_xml(|root, ns| {
            root.children()
                .filter(|n| n.is_element() && n.has_tag_name((ns, "stack")))
                .map(|frame| {
                    let number = |name: &str| -> Result<u32> {
                        match frame.attribute(name) {
                            None => Ok(0),
                            Some(v) => v.trim().parse().map_err(|e| {
                                self.format_error(format!("invalid frame {name} \"{v}\": {e}"))
                            }),
                        }
                    };
                    let text = |name: &str| frame.attribute(name).map(str::to_string);
                    Ok(StackFrame {
                        level: number("level")?,
                        ty: text("type").unwrap_or_else(|| "file".to_string()),
                        filename: text("filename").unwrap_or_default(),
                        lineno: number("lineno")?,
                        location: text("where"),
                        cmd_begin: text("cmdbegin"),
                        cmd_end: text("cmdend"),
                    })
                })
                .collect()
        })?
    }

    /// Context names (`context_names`) by context id.
    pub fn context_names(&self) -> Result<BTreeMap<i64, String>> {
        self.with_xml(|root, _| {
            root.children()
                .filter(|n| n.is_element())
                .map(|ctx| {
                    let id = ctx.attribute("id").unwrap_or_default();
                    let id = id.trim().parse::<i64>().map_err(|e| {
                        self.format_error(format!("invalid context id \"{id}\": {e}"))
                    })?;
                    let name = ctx.attribute("name").unwrap_or_default().to_string();
                    Ok((id, name))
                })
                .collect()
        })?
    }

    /// Expression text an `eval` command was issued with.
    pub fn eval_code(&self) -> Result<String> {
        let Some((_, encoded)) = self.args.split_once(EVAL_SEPARATOR) else {
            return Err(self.format_error(format!(
                "no expression in eval arguments \"{}\"",
                self.args
            )));
        };
        let mut encoded = encoded.trim().to_string();
        // engines and transports may drop the padding
        let missing_padding = encoded.len() % 4;
        if missing_padding != 0 {
            encoded.push_str(&"=".repeat(4 - missing_padding));
        }
        decode_base64(&encoded)
            .map_err(|e| self.format_error(format!("undecodable eval expression: {e}")))
    }

    /// Property trees of a `context_get`, `property_get` or `eval` response, one per top-level element.
    pub fn properties(&self) -> Result<Vec<PropertyTree>> {
        let code = match self.kind {
            ResponseKind::Eval => Some(self.eval_code()?),
            _ => None,
        };
        let naming = match &code {
            Some(code) => Naming::Eval {
                code,
                language: &self.language,
            },
            None => Naming::Context,
        };

        self.with_xml(|root, ns| {
            root.children()
                .filter(|n| n.is_element())
                .map(|node| PropertyTree::build(node, ns, naming))
                .collect()
        })?
    }

    /// All properties of all trees, see [`PropertyTree::flatten`].
    pub fn property_list(&self) -> Result<Vec<Property>> {
        Ok(PropertyTree::flatten(self.properties()?))
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self.kind {
            ResponseKind::Status => self.status().ok(),
            ResponseKind::BreakpointSet => self.root_attribute("id").ok().flatten(),
            ResponseKind::Feature => match self.is_supported() {
                Ok(true) => self.feature_value().ok(),
                Ok(false) => Some(FEATURE_NOT_SUPPORTED.to_string()),
                Err(_) => None,
            },
            _ => None,
        };
        f.write_str(text.as_deref().unwrap_or(&self.payload))
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .finish()
    }
}
