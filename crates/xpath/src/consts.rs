/// Namespace URI of the W3C error codes (`err:` prefix).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// Default function namespace (`fn:` prefix).
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
/// Implicitly bound `xml` namespace.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Unicode codepoint collation, the only collation the core compares with.
pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
