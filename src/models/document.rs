//! # 페이지 문서 모델
//!
//! 한 페이지의 리치 텍스트 내용을 타입이 있는 트리로 표현합니다.
//!
//! ```text
//! Document
//!  └─ Block (paragraph, heading, bulletList, ..., image, drawing)
//!      └─ Node = Block | Inline
//!                        └─ Text { text, marks } | HardBreak
//! ```
//!
//! 노드 종류는 닫힌 열거형(enum)입니다. 새 종류를 추가하면 `match`를 쓰는
//! 모든 곳(코덱, 평문 추출기)이 컴파일 에러로 알려줍니다.
//!
//! JSON 변환은 `services::codec`이 담당합니다. 이 모듈은 순수 데이터와
//! 정규화(normalize), 구조 비교, 평문 추출만 다룹니다.

use serde_json::{Map, Value};

/// 노드별 속성 맵 (이미지 src, objectKey, width/height, drawingId, textAlign 등)
pub type Attrs = Map<String, Value>;

/// 한 페이지의 문서. 빈 문서는 `{type:"doc", content:[]}`이며 null이 되지 않습니다.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub content: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub attrs: Attrs,
    pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Block(Block),
    Inline(Inline),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text { text: String, marks: Marks },
    HardBreak,
}

/// 블록 노드 종류.
///
/// `Heading`의 level과 `TaskItem`의 checked는 attrs가 아니라 여기에 담깁니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    BulletList,
    OrderedList,
    TaskList,
    ListItem,
    TaskItem { checked: bool },
    Blockquote,
    CodeBlock,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    Image,
    Drawing,
    HorizontalRule,
}

/// 블록이 어떤 자식을 가질 수 있는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentRule {
    /// 인라인 노드만 (paragraph, heading, codeBlock)
    Inline,
    /// 블록만 (blockquote, listItem, taskItem, tableCell, tableHeader)
    Blocks,
    ListItems,
    TaskItems,
    Rows,
    Cells,
    /// 자식 없음 (image, drawing, horizontalRule)
    Empty,
}

pub const MIN_HEADING_LEVEL: u8 = 1;
pub const MAX_HEADING_LEVEL: u8 = 3;

impl BlockKind {
    /// 편집기 JSON의 `type` 문자열
    pub fn type_name(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading { .. } => "heading",
            BlockKind::BulletList => "bulletList",
            BlockKind::OrderedList => "orderedList",
            BlockKind::TaskList => "taskList",
            BlockKind::ListItem => "listItem",
            BlockKind::TaskItem { .. } => "taskItem",
            BlockKind::Blockquote => "blockquote",
            BlockKind::CodeBlock => "codeBlock",
            BlockKind::Table => "table",
            BlockKind::TableRow => "tableRow",
            BlockKind::TableCell => "tableCell",
            BlockKind::TableHeader => "tableHeader",
            BlockKind::Image => "image",
            BlockKind::Drawing => "drawing",
            BlockKind::HorizontalRule => "horizontalRule",
        }
    }

    fn content_rule(&self) -> ContentRule {
        match self {
            BlockKind::Paragraph | BlockKind::Heading { .. } | BlockKind::CodeBlock => {
                ContentRule::Inline
            }
            BlockKind::Blockquote
            | BlockKind::ListItem
            | BlockKind::TaskItem { .. }
            | BlockKind::TableCell
            | BlockKind::TableHeader => ContentRule::Blocks,
            BlockKind::BulletList | BlockKind::OrderedList => ContentRule::ListItems,
            BlockKind::TaskList => ContentRule::TaskItems,
            BlockKind::Table => ContentRule::Rows,
            BlockKind::TableRow => ContentRule::Cells,
            BlockKind::Image | BlockKind::Drawing | BlockKind::HorizontalRule => {
                ContentRule::Empty
            }
        }
    }

    /// 특정 부모 안에서만 의미가 있는 종류 (리스트 항목, 표 행/셀)
    fn is_item(&self) -> bool {
        matches!(
            self,
            BlockKind::ListItem
                | BlockKind::TaskItem { .. }
                | BlockKind::TableRow
                | BlockKind::TableCell
                | BlockKind::TableHeader
        )
    }
}

impl ContentRule {
    fn accepts(&self, child: &BlockKind) -> bool {
        match self {
            ContentRule::ListItems => matches!(child, BlockKind::ListItem),
            ContentRule::TaskItems => matches!(child, BlockKind::TaskItem { .. }),
            ContentRule::Rows => matches!(child, BlockKind::TableRow),
            ContentRule::Cells => matches!(child, BlockKind::TableCell | BlockKind::TableHeader),
            ContentRule::Blocks => !child.is_item(),
            ContentRule::Inline | ContentRule::Empty => false,
        }
    }
}

// ── 마크(Mark) ──

/// 텍스트 서식.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Link { href: String, target: Option<String> },
    TextColor(String),
    /// 색 지정이 없으면 편집기 기본 하이라이트 색
    Highlight(Option<String>),
    FontFamily(String),
    FontSize(String),
}

impl Mark {
    pub fn type_name(&self) -> &'static str {
        match self {
            Mark::Bold => "bold",
            Mark::Italic => "italic",
            Mark::Underline => "underline",
            Mark::Strike => "strike",
            Mark::Code => "code",
            Mark::Link { .. } => "link",
            Mark::TextColor(_) => "textColor",
            Mark::Highlight(_) => "highlight",
            Mark::FontFamily(_) => "fontFamily",
            Mark::FontSize(_) => "fontSize",
        }
    }

    // 정렬 순서 = 선언 순서
    fn rank(&self) -> u8 {
        match self {
            Mark::Bold => 0,
            Mark::Italic => 1,
            Mark::Underline => 2,
            Mark::Strike => 3,
            Mark::Code => 4,
            Mark::Link { .. } => 5,
            Mark::TextColor(_) => 6,
            Mark::Highlight(_) => 7,
            Mark::FontFamily(_) => 8,
            Mark::FontSize(_) => 9,
        }
    }
}

/// 종류별로 최대 하나씩만 갖는 마크 집합.
///
/// 같은 종류의 마크를 다시 적용하면 중복되지 않고 속성만 바뀝니다.
/// 내부 순서는 항상 `Mark` 선언 순서라서 구조 비교가 안정적입니다.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Marks(Vec<Mark>);

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, mark: Mark) {
        match self.0.iter_mut().find(|m| m.rank() == mark.rank()) {
            Some(existing) => *existing = mark,
            None => {
                self.0.push(mark);
                self.0.sort_by_key(Mark::rank);
            }
        }
    }

    /// 같은 종류의 마크를 제거합니다. 제거했으면 true.
    pub fn remove_kind(&mut self, like: &Mark) -> bool {
        let before = self.0.len();
        self.0.retain(|m| m.rank() != like.rank());
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Mark> for Marks {
    fn from_iter<I: IntoIterator<Item = Mark>>(iter: I) -> Self {
        let mut marks = Marks::new();
        for mark in iter {
            marks.apply(mark);
        }
        marks
    }
}

// ── 생성 도우미 ──

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
            content: Vec::new(),
        }
    }

    pub fn paragraph(text: &str) -> Self {
        let mut block = Block::new(BlockKind::Paragraph);
        if !text.is_empty() {
            block.content.push(Node::text(text));
        }
        block
    }

    pub fn heading(level: u8, text: &str) -> Self {
        let mut block = Block::new(BlockKind::Heading { level });
        block.content.push(Node::text(text));
        block
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.content.extend(children);
        self
    }
}

impl Node {
    pub fn text(text: &str) -> Self {
        Node::Inline(Inline::Text {
            text: text.to_string(),
            marks: Marks::new(),
        })
    }

    pub fn marked(text: &str, marks: impl IntoIterator<Item = Mark>) -> Self {
        Node::Inline(Inline::Text {
            text: text.to_string(),
            marks: marks.into_iter().collect(),
        })
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

// ── 정규화 ──

impl Document {
    /// 정규 빈 문서
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn new(content: Vec<Block>) -> Self {
        Self { content }
    }

    /// 트리를 정규형으로 바꿉니다. 여러 번 적용해도 결과가 같습니다.
    ///
    /// - 부모가 허용하지 않는 자식은 버리거나, 인라인 묶음은 paragraph로 감쌉니다
    /// - 인접한 같은 마크의 텍스트는 합치고, 빈 텍스트는 버립니다
    /// - heading level은 1..=3으로 자릅니다
    /// - 비어 있는 리스트/표는 버리고, 비어 있는 항목에는 빈 paragraph를 넣습니다
    pub fn normalize(self) -> Self {
        let nodes = self.content.into_iter().map(Node::Block).collect();
        Self {
            content: normalize_blocks(nodes),
        }
    }

    /// 구조적 깊은 비교. 같은 내용을 다시 저장하는 일을 막는 데 씁니다.
    pub fn equals(&self, other: &Document) -> bool {
        self == other
    }

    /// 미리보기/AI 컨텍스트용 평문 투영.
    ///
    /// 문서 순서대로 텍스트를 이어 붙이고, 블록 사이는 줄바꿈으로 구분합니다.
    /// 텍스트가 없는 블록(이미지 등)은 아무것도 남기지 않습니다.
    pub fn extract_plain_text(&self) -> String {
        join_non_empty(self.content.iter().map(Block::plain_text))
    }

    pub fn word_count(&self) -> usize {
        self.extract_plain_text().split_whitespace().count()
    }

    /// 평문 앞부분 `max_chars`자. 문자(char) 경계에서 자르므로 한글에서도 안전합니다.
    pub fn preview(&self, max_chars: usize) -> String {
        self.extract_plain_text().chars().take(max_chars).collect()
    }
}

/// 블록 문맥의 노드 목록을 정규화합니다. 최상위 문서와 컨테이너 항목이 사용합니다.
pub(crate) fn normalize_blocks(nodes: Vec<Node>) -> Vec<Block> {
    let mut out = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    for node in nodes {
        match node {
            Node::Inline(inline) => inline_run.push(Node::Inline(inline)),
            Node::Block(block) => {
                flush_inline_run(&mut inline_run, &mut out);
                if block.kind.is_item() {
                    // 부모 밖으로 떨어진 항목은 내용만 살립니다.
                    out.extend(normalize_blocks(block.content));
                } else if let Some(block) = normalize_block(block) {
                    out.push(block);
                }
            }
        }
    }
    flush_inline_run(&mut inline_run, &mut out);
    out
}

fn flush_inline_run(run: &mut Vec<Node>, out: &mut Vec<Block>) {
    if run.is_empty() {
        return;
    }
    let paragraph = Block::new(BlockKind::Paragraph).with_children(run.drain(..));
    if let Some(paragraph) = normalize_block(paragraph) {
        out.push(paragraph);
    }
}

/// 블록 하나를 정규화합니다. 버려야 하면 None.
fn normalize_block(mut block: Block) -> Option<Block> {
    match block.kind {
        BlockKind::Heading { level } => {
            block.kind = BlockKind::Heading {
                level: level.clamp(MIN_HEADING_LEVEL, MAX_HEADING_LEVEL),
            };
            block.attrs.remove("level");
        }
        BlockKind::TaskItem { .. } => {
            block.attrs.remove("checked");
        }
        _ => {}
    }

    let rule = block.kind.content_rule();
    let children = std::mem::take(&mut block.content);
    block.content = match rule {
        ContentRule::Inline => normalize_inline(children, block.kind == BlockKind::CodeBlock),
        ContentRule::Blocks => {
            let mut blocks = normalize_blocks(children);
            if blocks.is_empty() {
                blocks.push(Block::new(BlockKind::Paragraph));
            }
            blocks.into_iter().map(Node::Block).collect()
        }
        ContentRule::ListItems | ContentRule::TaskItems | ContentRule::Rows | ContentRule::Cells => {
            let items: Vec<Node> = children
                .into_iter()
                .filter_map(|child| match child {
                    Node::Block(b) if rule.accepts(&b.kind) => normalize_block(b).map(Node::Block),
                    _ => None,
                })
                .collect();
            if items.is_empty() {
                return None;
            }
            items
        }
        ContentRule::Empty => Vec::new(),
    };
    Some(block)
}

/// 인라인 문맥 정규화: 중첩 블록은 인라인 자손만 꺼내고, 텍스트를 합칩니다.
fn normalize_inline(children: Vec<Node>, code: bool) -> Vec<Node> {
    let mut flat = Vec::new();
    flatten_inline(children, &mut flat);

    let mut out: Vec<Node> = Vec::new();
    for inline in flat {
        let inline = match inline {
            // 코드 블록 안에는 서식도 줄바꿈 노드도 없습니다.
            Inline::Text { text, .. } if code => Inline::Text {
                text,
                marks: Marks::new(),
            },
            Inline::HardBreak if code => Inline::Text {
                text: "\n".to_string(),
                marks: Marks::new(),
            },
            other => other,
        };

        match inline {
            Inline::Text { text, .. } if text.is_empty() => {}
            Inline::Text { text, marks } => {
                if let Some(Node::Inline(Inline::Text {
                    text: prev_text,
                    marks: prev_marks,
                })) = out.last_mut()
                {
                    if *prev_marks == marks {
                        prev_text.push_str(&text);
                        continue;
                    }
                }
                out.push(Node::Inline(Inline::Text { text, marks }));
            }
            Inline::HardBreak => out.push(Node::Inline(Inline::HardBreak)),
        }
    }
    out
}

fn flatten_inline(nodes: Vec<Node>, out: &mut Vec<Inline>) {
    for node in nodes {
        match node {
            Node::Inline(inline) => out.push(inline),
            Node::Block(block) => flatten_inline(block.content, out),
        }
    }
}

// ── 평문 추출 ──

impl Block {
    fn plain_text(&self) -> String {
        match self.kind {
            BlockKind::Paragraph | BlockKind::Heading { .. } | BlockKind::CodeBlock => {
                self.content.iter().map(Node::inline_text).collect()
            }
            BlockKind::Image | BlockKind::Drawing | BlockKind::HorizontalRule => String::new(),
            BlockKind::BulletList
            | BlockKind::OrderedList
            | BlockKind::TaskList
            | BlockKind::ListItem
            | BlockKind::TaskItem { .. }
            | BlockKind::Blockquote
            | BlockKind::Table
            | BlockKind::TableRow
            | BlockKind::TableCell
            | BlockKind::TableHeader => join_non_empty(self.content.iter().map(|node| match node {
                Node::Block(child) => child.plain_text(),
                Node::Inline(_) => node.inline_text(),
            })),
        }
    }
}

impl Node {
    fn inline_text(&self) -> String {
        match self {
            Node::Inline(Inline::Text { text, .. }) => text.clone(),
            Node::Inline(Inline::HardBreak) => "\n".to_string(),
            Node::Block(block) => block.plain_text(),
        }
    }
}

fn join_non_empty(parts: impl Iterator<Item = String>) -> String {
    parts
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
