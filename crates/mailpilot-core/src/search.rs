//! Search expressions and their IMAP rendering.
//!
//! Free-text searches match one text against several message fields. Each
//! field becomes a leaf predicate and the leaves are folded into a balanced
//! `OR` tree with [`combine`], which keeps the rendered query shallow even
//! when many fields are searched.

/// A single match condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Subject contains the text.
    Subject(String),
    /// Sender contains the text.
    From(String),
    /// `To` header contains the text.
    To(String),
    /// Any recipient (`To`, `Cc` or `Bcc`) contains the text.
    Recipient(String),
    /// Headers or body contain the text.
    Content(String),
    /// Body contains the text.
    Body(String),
}

impl Predicate {
    fn write_imap(&self, out: &mut String) {
        match self {
            Self::Subject(text) => push_key(out, "SUBJECT", text),
            Self::From(text) => push_key(out, "FROM", text),
            Self::To(text) => push_key(out, "TO", text),
            Self::Recipient(text) => {
                out.push_str("OR ");
                push_key(out, "TO", text);
                out.push_str(" OR ");
                push_key(out, "CC", text);
                out.push(' ');
                push_key(out, "BCC", text);
            }
            Self::Content(text) => push_key(out, "TEXT", text),
            Self::Body(text) => push_key(out, "BODY", text),
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Subject(text)
            | Self::From(text)
            | Self::To(text)
            | Self::Recipient(text)
            | Self::Content(text)
            | Self::Body(text) => text,
        }
    }
}

/// Boolean search tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchExpr {
    /// One predicate.
    Leaf(Predicate),
    /// Either side matches.
    Or(Box<Self>, Box<Self>),
    /// Both sides match.
    And(Box<Self>, Box<Self>),
}

impl SearchExpr {
    /// Wraps a predicate.
    #[must_use]
    pub const fn leaf(predicate: Predicate) -> Self {
        Self::Leaf(predicate)
    }

    /// Builds `left OR right`.
    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Builds `left AND right`.
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    /// Height of the tree; a leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Or(left, right) | Self::And(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    /// Predicates in left-to-right order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Predicate> {
        let mut found = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                Self::Leaf(predicate) => found.push(predicate),
                Self::Or(left, right) | Self::And(left, right) => {
                    pending.push(right);
                    pending.push(left);
                }
            }
        }
        found
    }

    /// Renders the search keys, without any `CHARSET` prefix.
    #[must_use]
    pub fn to_imap(&self) -> String {
        let mut out = String::new();
        self.write_imap(&mut out);
        out
    }

    /// Renders the full `SEARCH` argument, declaring UTF-8 when needed.
    #[must_use]
    pub fn to_query(&self) -> String {
        let keys = self.to_imap();
        if self.leaves().iter().any(|leaf| !leaf.text().is_ascii()) {
            format!("CHARSET UTF-8 {keys}")
        } else {
            keys
        }
    }

    fn write_imap(&self, out: &mut String) {
        match self {
            Self::Leaf(predicate) => predicate.write_imap(out),
            Self::Or(left, right) => {
                out.push_str("OR (");
                left.write_imap(out);
                out.push_str(") (");
                right.write_imap(out);
                out.push(')');
            }
            Self::And(left, right) => {
                out.push('(');
                left.write_imap(out);
                out.push_str(") (");
                right.write_imap(out);
                out.push(')');
            }
        }
    }
}

/// Folds expressions into a balanced `OR` tree.
///
/// Consecutive pairs are joined each round; an unpaired trailing element is
/// carried into the next round as is. For `n` inputs the result has depth
/// `ceil(log2(n))` and contains every input exactly once.
#[must_use]
pub fn combine(exprs: impl IntoIterator<Item = SearchExpr>) -> Option<SearchExpr> {
    let mut level: Vec<SearchExpr> = exprs.into_iter().collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();
        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => next.push(SearchExpr::or(left, right)),
                None => next.push(left),
            }
        }
        level = next;
    }

    level.pop()
}

/// Message fields a free-text search can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    /// Subject header.
    Subject,
    /// Sender.
    From,
    /// Primary recipients.
    To,
    /// Any recipient.
    Recipient,
    /// Whole message text.
    Content,
    /// Message body.
    Body,
}

impl SearchField {
    /// Every field.
    pub const ALL: [Self; 6] = [
        Self::Subject,
        Self::From,
        Self::To,
        Self::Recipient,
        Self::Content,
        Self::Body,
    ];

    /// Builds the predicate matching `text` in this field.
    #[must_use]
    pub fn predicate(self, text: &str) -> Predicate {
        let text = text.to_string();
        match self {
            Self::Subject => Predicate::Subject(text),
            Self::From => Predicate::From(text),
            Self::To => Predicate::To(text),
            Self::Recipient => Predicate::Recipient(text),
            Self::Content => Predicate::Content(text),
            Self::Body => Predicate::Body(text),
        }
    }
}

/// A free-text search in one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Text to look for.
    pub text: String,
    /// Fields to look in.
    pub fields: Vec<SearchField>,
    /// Folder to search.
    pub folder: String,
    /// Maximum results; 0 returns every match.
    pub page_size: u32,
    /// Newest matches to skip.
    pub offset: u32,
}

impl SearchQuery {
    /// Searches every field of INBOX for `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: SearchField::ALL.to_vec(),
            folder: "INBOX".to_string(),
            page_size: 0,
            offset: 0,
        }
    }

    /// Sets the folder to search.
    #[must_use]
    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Restricts the fields searched.
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = SearchField>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }

    /// Limits the results to one page.
    #[must_use]
    pub const fn page(mut self, page_size: u32, offset: u32) -> Self {
        self.page_size = page_size;
        self.offset = offset;
        self
    }

    /// Expression matching the text in any selected field.
    ///
    /// Blank text or an empty field list yields `None`.
    #[must_use]
    pub fn expression(&self) -> Option<SearchExpr> {
        if self.text.trim().is_empty() {
            return None;
        }
        combine(
            self.fields
                .iter()
                .map(|field| SearchExpr::leaf(field.predicate(&self.text))),
        )
    }
}

/// Expression matching backup messages exchanged with `email`.
///
/// `(FROM email OR TO email) AND (any of the subjects)`; `None` when no
/// subject is given.
#[must_use]
pub fn backup_expression(email: &str, subjects: &[String]) -> Option<SearchExpr> {
    let subjects = combine(
        subjects
            .iter()
            .map(|subject| SearchExpr::leaf(Predicate::Subject(subject.clone()))),
    )?;
    let correspondent = SearchExpr::or(
        SearchExpr::leaf(Predicate::From(email.to_string())),
        SearchExpr::leaf(Predicate::To(email.to_string())),
    );
    Some(SearchExpr::and(correspondent, subjects))
}

fn push_key(out: &mut String, key: &str, text: &str) {
    out.push_str(key);
    out.push(' ');
    push_quoted(out, text);
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' | '"' => {
                out.push('\\');
                out.push(ch);
            }
            '\r' | '\n' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out.push('"');
}
