//! Atom (RFC 4287) normalizer.
//!
//! Text constructs whose `type` names an html flavour are minified; plain
//! text is stored as-is. Elements outside [`FEED_FIELDS`] and
//! [`ENTRY_FIELDS`] are ignored.

use serde_json::Value;

use super::markup::normalize_text;
use super::model::{
    Category, Content, FeedGenerator, FeedItem, FeedMetadata, Generator, Link, Person,
};
use super::parser::FormatError;
use super::xml_tree::{
    attribute, child_text, entries, lookup, occurrences, parse_tree, text, TreeOptions,
};

/// Every Atom path that can repeat.
pub(crate) const ARRAY_PATHS: &[&str] = &[
    "feed.entry",
    "feed.link",
    "feed.category",
    "feed.author",
    "feed.contributor",
    "feed.entry.link",
    "feed.entry.category",
    "feed.entry.author",
    "feed.entry.contributor",
];

/// Text constructs that may carry inline XHTML.
const MARKUP_PATHS: &[&str] = &[
    "feed.title",
    "feed.subtitle",
    "feed.rights",
    "feed.entry.title",
    "feed.entry.summary",
    "feed.entry.content",
    "feed.entry.rights",
];

const TREE_OPTIONS: TreeOptions = TreeOptions {
    array_paths: ARRAY_PATHS,
    markup_paths: MARKUP_PATHS,
};

#[derive(Debug, Clone, Copy)]
enum FeedField {
    Id,
    Title,
    Subtitle,
    Updated,
    Rights,
    Icon,
    Logo,
    Generator,
    Link,
    Author,
    Contributor,
    Category,
    Entry,
}

const FEED_FIELDS: &[(&str, FeedField)] = &[
    ("id", FeedField::Id),
    ("title", FeedField::Title),
    ("subtitle", FeedField::Subtitle),
    ("updated", FeedField::Updated),
    ("rights", FeedField::Rights),
    ("icon", FeedField::Icon),
    ("logo", FeedField::Logo),
    ("generator", FeedField::Generator),
    ("link", FeedField::Link),
    ("author", FeedField::Author),
    ("contributor", FeedField::Contributor),
    ("category", FeedField::Category),
    ("entry", FeedField::Entry),
];

#[derive(Debug, Clone, Copy)]
enum EntryField {
    Id,
    Title,
    Summary,
    Content,
    Published,
    Updated,
    Rights,
    Link,
    Author,
    Contributor,
    Category,
}

const ENTRY_FIELDS: &[(&str, EntryField)] = &[
    ("id", EntryField::Id),
    ("title", EntryField::Title),
    ("summary", EntryField::Summary),
    ("content", EntryField::Content),
    ("published", EntryField::Published),
    ("updated", EntryField::Updated),
    ("rights", EntryField::Rights),
    ("link", EntryField::Link),
    ("author", EntryField::Author),
    ("contributor", EntryField::Contributor),
    ("category", EntryField::Category),
];

/// Normalizes an Atom document into feed metadata and its entries in
/// document order.
///
/// # Errors
///
/// Returns [`FormatError::MissingRoot`] if there is no `<feed>` root.
pub(crate) fn normalize(xml: &str) -> Result<(FeedMetadata, Vec<FeedItem>), FormatError> {
    let tree = parse_tree(xml, &TREE_OPTIONS)?;
    let feed = tree.get("feed").ok_or(FormatError::MissingRoot("feed"))?;

    let mut metadata = FeedMetadata::default();
    let mut items = Vec::new();

    for (name, value) in entries(feed) {
        let Some(field) = lookup(FEED_FIELDS, name) else {
            continue;
        };
        match field {
            FeedField::Id => metadata.id = text(value),
            FeedField::Title => metadata.title = text_construct(value),
            FeedField::Subtitle => metadata.subtitle = text_construct(value),
            FeedField::Updated => metadata.updated = text(value),
            FeedField::Rights => metadata.rights = text_construct(value),
            FeedField::Icon => metadata.icon = text(value),
            FeedField::Logo => metadata.logo = text(value),
            FeedField::Generator => {
                metadata.generator = Some(FeedGenerator::Described(Generator {
                    name: text(value).filter(|name| !name.is_empty()),
                    uri: attribute(value, "uri"),
                    version: attribute(value, "version"),
                }))
            }
            FeedField::Link => metadata.links = links(value),
            FeedField::Author => metadata.authors = persons(value),
            FeedField::Contributor => metadata.contributors = persons(value),
            FeedField::Category => metadata.categories = categories(value),
            FeedField::Entry => items.extend(occurrences(value).map(normalize_entry)),
        }
    }

    Ok((metadata, items))
}

fn normalize_entry(node: &Value) -> FeedItem {
    let mut item = FeedItem::default();
    for (name, value) in entries(node) {
        let Some(field) = lookup(ENTRY_FIELDS, name) else {
            continue;
        };
        match field {
            EntryField::Id => item.id = text(value),
            EntryField::Title => item.title = text_construct(value),
            EntryField::Summary => item.summary = text_construct(value),
            EntryField::Content => {
                let media_type = attribute(value, "type");
                item.content = Some(Content {
                    value: text(value).map(|body| normalize_text(body, media_type.as_deref())),
                    src: attribute(value, "src"),
                    media_type,
                })
            }
            EntryField::Published => item.published = text(value),
            EntryField::Updated => item.updated = text(value),
            EntryField::Rights => item.rights = text_construct(value),
            EntryField::Link => item.links = links(value),
            EntryField::Author => item.authors = persons(value),
            EntryField::Contributor => item.contributors = persons(value),
            EntryField::Category => item.categories = categories(value),
        }
    }
    item
}

/// Text construct (`title`, `subtitle`, `summary`, `rights`), minified when
/// its `type` is html or xhtml.
fn text_construct(value: &Value) -> Option<String> {
    let media_type = attribute(value, "type");
    text(value).map(|body| normalize_text(body, media_type.as_deref()))
}

fn links(value: &Value) -> Vec<Link> {
    occurrences(value)
        .filter_map(|link| {
            Some(Link {
                href: attribute(link, "href")?,
                rel: attribute(link, "rel"),
                media_type: attribute(link, "type"),
                hreflang: attribute(link, "hreflang"),
                title: attribute(link, "title"),
                length: attribute(link, "length"),
            })
        })
        .collect()
}

fn persons(value: &Value) -> Vec<Person> {
    occurrences(value)
        .map(|person| Person {
            name: child_text(person, "name"),
            uri: child_text(person, "uri"),
            email: child_text(person, "email"),
        })
        .collect()
}

fn categories(value: &Value) -> Vec<Category> {
    occurrences(value)
        .filter_map(|category| {
            Some(Category {
                term: attribute(category, "term")?,
                scheme: attribute(category, "scheme"),
                label: attribute(category, "label"),
                ..Default::default()
            })
        })
        .collect()
}
