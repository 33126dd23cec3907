//! # 문서 코덱
//!
//! 타입 트리(`Document`)와 저장소가 받는 JSON 값 사이를 변환합니다.
//!
//! - `encode`: 트리 → JSON (`content_json` 컬럼에 그대로 저장되는 형태)
//! - `decode`: JSON → 트리. **절대 실패하지 않습니다.** null, 잘린 객체,
//!   문자열로 한 번 더 감싼 JSON 모두 정규 빈 문서나 살릴 수 있는 만큼의 트리가 됩니다.
//! - `decode_strict`: 자동 저장 입력 검증용. 잘못된 구조를 에러로 알려줍니다.
//!
//! 정규화된 문서 `d`에 대해 `decode(Some(&encode(&d))) == d`가 성립합니다.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::error::AppError;
use crate::models::document::{
    normalize_blocks, Attrs, Block, BlockKind, Document, Inline, Mark, Marks, Node,
};

/// 엄격한 검증에서 발견한 구조 오류. `path`는 `content[1].content[0]` 형태입니다.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("root node type must be \"doc\"")]
    NotADocument,
    #[error("{path}: content must be an array")]
    InvalidContent { path: String },
    #[error("{path}: node must be an object with a string \"type\"")]
    MissingType { path: String },
    #[error("{path}: unknown node type \"{name}\"")]
    UnknownType { path: String, name: String },
    #[error("{path}: text node requires a string \"text\"")]
    InvalidText { path: String },
    #[error("{path}: invalid mark")]
    InvalidMark { path: String },
}

impl From<CodecError> for AppError {
    fn from(err: CodecError) -> Self {
        AppError::BadRequest(format!("Malformed document: {}", err))
    }
}

// ── 인코딩 ──

pub fn encode(doc: &Document) -> Value {
    json!({
        "type": "doc",
        "content": doc.content.iter().map(encode_block).collect::<Vec<_>>(),
    })
}

/// `content_json` TEXT 컬럼에 쓰는 문자열 형태
pub fn encode_to_string(doc: &Document) -> String {
    encode(doc).to_string()
}

fn encode_block(block: &Block) -> Value {
    let mut obj = Map::new();
    obj.insert("type".into(), block.kind.type_name().into());

    let mut attrs = block.attrs.clone();
    match block.kind {
        BlockKind::Heading { level } => {
            attrs.insert("level".into(), level.into());
        }
        BlockKind::TaskItem { checked } => {
            attrs.insert("checked".into(), checked.into());
        }
        _ => {}
    }
    if !attrs.is_empty() {
        obj.insert("attrs".into(), Value::Object(attrs));
    }
    if !block.content.is_empty() {
        let content = block.content.iter().map(encode_node).collect();
        obj.insert("content".into(), Value::Array(content));
    }
    Value::Object(obj)
}

fn encode_node(node: &Node) -> Value {
    match node {
        Node::Block(block) => encode_block(block),
        Node::Inline(Inline::HardBreak) => json!({ "type": "hardBreak" }),
        Node::Inline(Inline::Text { text, marks }) => {
            let mut obj = Map::new();
            obj.insert("type".into(), "text".into());
            obj.insert("text".into(), text.clone().into());
            if !marks.is_empty() {
                let marks = marks.iter().map(encode_mark).collect();
                obj.insert("marks".into(), Value::Array(marks));
            }
            Value::Object(obj)
        }
    }
}

fn encode_mark(mark: &Mark) -> Value {
    let attrs = match mark {
        Mark::Bold | Mark::Italic | Mark::Underline | Mark::Strike | Mark::Code => None,
        Mark::Link { href, target } => {
            let mut attrs = Map::new();
            attrs.insert("href".into(), href.clone().into());
            if let Some(target) = target {
                attrs.insert("target".into(), target.clone().into());
            }
            Some(Value::Object(attrs))
        }
        Mark::TextColor(color) => Some(json!({ "color": color })),
        Mark::Highlight(Some(color)) => Some(json!({ "color": color })),
        Mark::Highlight(None) => None,
        Mark::FontFamily(family) => Some(json!({ "fontFamily": family })),
        Mark::FontSize(size) => Some(json!({ "fontSize": size })),
    };
    match attrs {
        Some(attrs) => json!({ "type": mark.type_name(), "attrs": attrs }),
        None => json!({ "type": mark.type_name() }),
    }
}

// ── 관대한 디코딩 ──

/// 어떤 입력이든 정규화된 문서로 바꿉니다.
///
/// - `None` / `null` / 객체가 아닌 값 → 빈 문서
/// - JSON 문자열 → 한 번 더 파싱 (그 결과도 문자열이면 빈 문서)
/// - `type`이 없거나 모르는 노드 → 버림
pub fn decode(raw: Option<&Value>) -> Document {
    match raw {
        Some(value) => decode_root(value, true),
        None => Document::empty(),
    }
}

/// `content_json` 컬럼 문자열을 읽습니다. 파싱에 실패하면 빈 문서.
pub fn parse(raw: &str) -> Document {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_root(&value, true),
        Err(e) => {
            tracing::debug!("content_json is not valid JSON, using empty document: {}", e);
            Document::empty()
        }
    }
}

fn decode_root(value: &Value, allow_reparse: bool) -> Document {
    match value {
        Value::Object(obj) => {
            if obj.get("type").and_then(Value::as_str) != Some("doc") {
                return Document::empty();
            }
            let nodes = obj
                .get("content")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(decode_node).collect())
                .unwrap_or_default();
            Document {
                content: normalize_blocks(nodes),
            }
        }
        Value::String(inner) if allow_reparse => match serde_json::from_str::<Value>(inner) {
            Ok(value) => decode_root(&value, false),
            Err(_) => Document::empty(),
        },
        _ => Document::empty(),
    }
}

fn decode_node(value: &Value) -> Option<Node> {
    let obj = value.as_object()?;
    let type_name = obj.get("type")?.as_str()?;

    match type_name {
        "text" => {
            let text = obj.get("text")?.as_str()?.to_string();
            let marks = obj
                .get("marks")
                .and_then(Value::as_array)
                .map(|marks| decode_marks(marks))
                .unwrap_or_default();
            Some(Node::Inline(Inline::Text { text, marks }))
        }
        "hardBreak" => Some(Node::Inline(Inline::HardBreak)),
        _ => {
            let mut attrs: Attrs = obj
                .get("attrs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let kind = block_kind(type_name, &mut attrs)?;
            let content = obj
                .get("content")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(decode_node).collect())
                .unwrap_or_default();
            Some(Node::Block(Block {
                kind,
                attrs,
                content,
            }))
        }
    }
}

/// `type` 문자열을 블록 종류로. heading level, taskItem checked는 attrs에서 꺼냅니다.
fn block_kind(type_name: &str, attrs: &mut Attrs) -> Option<BlockKind> {
    let kind = match type_name {
        "paragraph" => BlockKind::Paragraph,
        "heading" => {
            let level = attrs
                .remove("level")
                .and_then(|v| v.as_u64())
                .map(|level| level.min(u8::MAX as u64) as u8)
                .unwrap_or(1);
            BlockKind::Heading { level }
        }
        "bulletList" => BlockKind::BulletList,
        "orderedList" => BlockKind::OrderedList,
        "taskList" => BlockKind::TaskList,
        "listItem" => BlockKind::ListItem,
        "taskItem" => {
            let checked = attrs
                .remove("checked")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            BlockKind::TaskItem { checked }
        }
        "blockquote" => BlockKind::Blockquote,
        "codeBlock" => BlockKind::CodeBlock,
        "table" => BlockKind::Table,
        "tableRow" => BlockKind::TableRow,
        "tableCell" => BlockKind::TableCell,
        "tableHeader" => BlockKind::TableHeader,
        "image" => BlockKind::Image,
        "drawing" => BlockKind::Drawing,
        "horizontalRule" => BlockKind::HorizontalRule,
        other => {
            tracing::debug!("dropping unknown node type {:?}", other);
            return None;
        }
    };
    Some(kind)
}

fn decode_marks(values: &[Value]) -> Marks {
    let mut marks = Marks::new();
    for value in values {
        for mark in decode_mark(value) {
            marks.apply(mark);
        }
    }
    marks
}

/// 마크 하나를 해석합니다. 편집기의 `textStyle`은 색/글꼴/크기 마크 여러 개로 나뉩니다.
fn decode_mark(value: &Value) -> Vec<Mark> {
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };
    let attr = |key: &str| {
        obj.get("attrs")
            .and_then(|attrs| attrs.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let mark = match obj.get("type").and_then(Value::as_str) {
        Some("bold") => Mark::Bold,
        Some("italic") => Mark::Italic,
        Some("underline") => Mark::Underline,
        Some("strike") => Mark::Strike,
        Some("code") => Mark::Code,
        Some("link") => match attr("href") {
            Some(href) => Mark::Link {
                href,
                target: attr("target"),
            },
            None => return Vec::new(),
        },
        Some("textColor") => match attr("color") {
            Some(color) => Mark::TextColor(color),
            None => return Vec::new(),
        },
        Some("highlight") => Mark::Highlight(attr("color")),
        Some("fontFamily") => match attr("fontFamily") {
            Some(family) => Mark::FontFamily(family),
            None => return Vec::new(),
        },
        Some("fontSize") => match attr("fontSize") {
            Some(size) => Mark::FontSize(size),
            None => return Vec::new(),
        },
        Some("textStyle") => {
            let mut split = Vec::new();
            if let Some(color) = attr("color") {
                split.push(Mark::TextColor(color));
            }
            if let Some(family) = attr("fontFamily") {
                split.push(Mark::FontFamily(family));
            }
            if let Some(size) = attr("fontSize") {
                split.push(Mark::FontSize(size));
            }
            return split;
        }
        _ => return Vec::new(),
    };
    vec![mark]
}

// ── 엄격한 디코딩 ──

/// 자동 저장 입력 검증. 구조가 올바를 때만 정규화된 문서를 돌려줍니다.
pub fn decode_strict(value: &Value) -> Result<Document, CodecError> {
    let obj = value.as_object().ok_or(CodecError::NotAnObject)?;
    if obj.get("type").and_then(Value::as_str) != Some("doc") {
        return Err(CodecError::NotADocument);
    }
    validate_children(obj, "")?;
    Ok(decode_root(value, false))
}

fn validate_children(obj: &Map<String, Value>, path: &str) -> Result<(), CodecError> {
    let Some(content) = obj.get("content") else {
        return Ok(());
    };
    let items = content.as_array().ok_or_else(|| CodecError::InvalidContent {
        path: display_path(path),
    })?;
    for (index, item) in items.iter().enumerate() {
        let child_path = format!("{}content[{}]", prefix(path), index);
        validate_node(item, &child_path)?;
    }
    Ok(())
}

fn validate_node(value: &Value, path: &str) -> Result<(), CodecError> {
    let missing_type = || CodecError::MissingType {
        path: path.to_string(),
    };
    let obj = value.as_object().ok_or_else(missing_type)?;
    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(missing_type)?;

    match type_name {
        "text" => {
            if !obj.get("text").is_some_and(Value::is_string) {
                return Err(CodecError::InvalidText {
                    path: path.to_string(),
                });
            }
            if let Some(marks) = obj.get("marks") {
                let valid = marks
                    .as_array()
                    .is_some_and(|marks| marks.iter().all(|m| !decode_mark(m).is_empty()));
                if !valid {
                    return Err(CodecError::InvalidMark {
                        path: path.to_string(),
                    });
                }
            }
            Ok(())
        }
        "hardBreak" => Ok(()),
        other => {
            let mut scratch = Attrs::new();
            if block_kind(other, &mut scratch).is_none() {
                return Err(CodecError::UnknownType {
                    path: path.to_string(),
                    name: other.to_string(),
                });
            }
            validate_children(obj, path)
        }
    }
}

fn prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}.", path)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}

// ── serde 연동 ──
// API 응답/요청에서 Document를 그대로 쓸 수 있도록 코덱을 serde에 연결합니다.
// 역직렬화는 관대한 decode를 따르므로 실패하지 않습니다.

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(decode(Some(&value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Block::heading(2, "Mitosis"),
            Block::new(BlockKind::Paragraph)
                .with_attr("textAlign", "center")
                .with_children([
                    Node::text("Phases: "),
                    Node::marked(
                        "prophase",
                        [
                            Mark::Bold,
                            Mark::Link {
                                href: "https://example.com".into(),
                                target: Some("_blank".into()),
                            },
                        ],
                    ),
                    Node::Inline(Inline::HardBreak),
                    Node::marked("metaphase", [Mark::Highlight(None), Mark::FontSize("18px".into())]),
                ]),
            Block::new(BlockKind::TaskList).with_children([Block::new(BlockKind::TaskItem {
                checked: true,
            })
            .with_children([Block::paragraph("review").into()])
            .into()]),
            Block::new(BlockKind::Image)
                .with_attr("src", "https://cdn.example.com/cell.png")
                .with_attr("objectKey", "u1/cell.png")
                .with_attr("width", 320),
        ])
        .normalize()
    }

    #[test]
    fn decode_inverts_encode() {
        let doc = sample();
        assert_eq!(decode(Some(&encode(&doc))), doc);
        assert_eq!(parse(&encode_to_string(&doc)), doc);
    }

    #[test]
    fn garbage_decodes_to_empty_document() {
        for raw in [
            Value::Null,
            json!(42),
            json!([1, 2, 3]),
            json!({}),
            json!({ "type": "paragraph" }),
            json!({ "type": "doc", "content": "nope" }),
            json!("not json at all"),
        ] {
            assert!(decode(Some(&raw)).is_empty(), "input: {}", raw);
        }
        assert!(decode(None).is_empty());
        assert!(parse("{\"type\":\"doc\",\"content\":[").is_empty());
    }

    #[test]
    fn string_wrapped_json_is_parsed_once_more() {
        let doc = sample();
        let wrapped = Value::String(encode_to_string(&doc));
        assert_eq!(decode(Some(&wrapped)), doc);

        // 두 겹 감싼 문자열은 더 파고들지 않습니다.
        let double = Value::String(wrapped.to_string());
        assert!(decode(Some(&double)).is_empty());
    }

    #[test]
    fn nodes_without_type_are_dropped() {
        let raw = json!({
            "type": "doc",
            "content": [
                { "content": [{ "type": "text", "text": "orphan" }] },
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "kept" },
                    { "text": "no type" },
                    { "type": "mention", "attrs": { "id": "u2" } }
                ]},
                "just a string"
            ]
        });
        let doc = decode(Some(&raw));
        assert_eq!(doc, Document::new(vec![Block::paragraph("kept")]));
    }

    #[test]
    fn text_style_marks_are_split() {
        let raw = json!({
            "type": "doc",
            "content": [{ "type": "paragraph", "content": [{
                "type": "text",
                "text": "red",
                "marks": [
                    { "type": "textStyle", "attrs": { "color": "#ff0000", "fontFamily": null, "fontSize": "14px" } },
                    { "type": "bold" },
                    { "type": "bold" }
                ]
            }]}]
        });
        let doc = decode(Some(&raw));
        let expected = Document::new(vec![Block::new(BlockKind::Paragraph).with_children([
            Node::marked("red", [Mark::Bold, Mark::TextColor("#ff0000".into()), Mark::FontSize("14px".into())]),
        ])]);
        assert_eq!(doc, expected);
    }

    #[test]
    fn plain_text_of_paragraph_and_image() {
        let raw = json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "Hello" }] },
                { "type": "image", "attrs": { "src": "x" } }
            ]
        });
        assert_eq!(decode(Some(&raw)).extract_plain_text(), "Hello");
    }

    #[test]
    fn strict_decoding_reports_structure_errors() {
        assert_eq!(decode_strict(&json!("doc")), Err(CodecError::NotAnObject));
        assert_eq!(decode_strict(&json!({ "type": "page" })), Err(CodecError::NotADocument));
        assert_eq!(
            decode_strict(&json!({ "type": "doc", "content": {} })),
            Err(CodecError::InvalidContent { path: "$".into() })
        );
        assert_eq!(
            decode_strict(&json!({ "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "text": "x" }] }
            ]})),
            Err(CodecError::MissingType { path: "content[0].content[0]".into() })
        );
        assert_eq!(
            decode_strict(&json!({ "type": "doc", "content": [{ "type": "video" }] })),
            Err(CodecError::UnknownType { path: "content[0]".into(), name: "video".into() })
        );
        assert_eq!(
            decode_strict(&json!({ "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": 5 }] }
            ]})),
            Err(CodecError::InvalidText { path: "content[0].content[0]".into() })
        );
    }

    #[test]
    fn strict_decoding_accepts_well_formed_documents() {
        let doc = sample();
        assert_eq!(decode_strict(&encode(&doc)), Ok(doc));
        assert_eq!(decode_strict(&json!({ "type": "doc" })), Ok(Document::empty()));
    }

    #[test]
    fn serde_uses_the_codec() {
        let doc = sample();
        let text = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);

        let lenient: Document = serde_json::from_str("null").unwrap();
        assert!(lenient.is_empty());
    }
}
