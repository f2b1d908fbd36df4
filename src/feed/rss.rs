//! RSS 2.0 normalizer.
//!
//! Only the elements listed in [`CHANNEL_FIELDS`] and [`ITEM_FIELDS`] are
//! read; everything else (including namespaced extensions such as
//! `dc:creator` or `atom:link`) is ignored.

use serde_json::Value;

use super::model::{
    Category, Cloud, Enclosure, FeedGenerator, FeedItem, FeedMetadata, Image, ItemSource,
    TextInput,
};
use super::parser::FormatError;
use super::xml_tree::{
    attribute, child_text, entries, lookup, occurrences, parse_tree, text, TreeOptions,
};

/// Every RSS path that can repeat.
pub(crate) const ARRAY_PATHS: &[&str] = &[
    "rss.channel.item",
    "rss.channel.item.category",
    "rss.channel.category",
    "rss.channel.skipHours.hour",
    "rss.channel.skipDays.day",
];

const TREE_OPTIONS: TreeOptions = TreeOptions {
    array_paths: ARRAY_PATHS,
    markup_paths: &[],
};

#[derive(Debug, Clone, Copy)]
enum ChannelField {
    Title,
    Link,
    Description,
    Language,
    Copyright,
    ManagingEditor,
    WebMaster,
    PubDate,
    LastBuildDate,
    Generator,
    Rating,
    Docs,
    Cloud,
    Category,
    Ttl,
    Image,
    TextInput,
    SkipHours,
    SkipDays,
    Item,
}

const CHANNEL_FIELDS: &[(&str, ChannelField)] = &[
    ("title", ChannelField::Title),
    ("link", ChannelField::Link),
    ("description", ChannelField::Description),
    ("language", ChannelField::Language),
    ("copyright", ChannelField::Copyright),
    ("managingEditor", ChannelField::ManagingEditor),
    ("webMaster", ChannelField::WebMaster),
    ("pubDate", ChannelField::PubDate),
    ("lastBuildDate", ChannelField::LastBuildDate),
    ("generator", ChannelField::Generator),
    ("rating", ChannelField::Rating),
    ("docs", ChannelField::Docs),
    ("cloud", ChannelField::Cloud),
    ("category", ChannelField::Category),
    ("ttl", ChannelField::Ttl),
    ("image", ChannelField::Image),
    ("textInput", ChannelField::TextInput),
    ("skipHours", ChannelField::SkipHours),
    ("skipDays", ChannelField::SkipDays),
    ("item", ChannelField::Item),
];

#[derive(Debug, Clone, Copy)]
enum ItemField {
    Title,
    Link,
    Description,
    Author,
    Comments,
    Guid,
    PubDate,
    Enclosure,
    Source,
    Category,
}

const ITEM_FIELDS: &[(&str, ItemField)] = &[
    ("title", ItemField::Title),
    ("link", ItemField::Link),
    ("description", ItemField::Description),
    ("author", ItemField::Author),
    ("comments", ItemField::Comments),
    ("guid", ItemField::Guid),
    ("pubDate", ItemField::PubDate),
    ("enclosure", ItemField::Enclosure),
    ("source", ItemField::Source),
    ("category", ItemField::Category),
];

/// Normalizes an RSS document into channel metadata and its items in
/// document order.
///
/// # Errors
///
/// Returns [`FormatError::MissingRoot`] if there is no `<rss>` root or it
/// has no `<channel>`. An empty `<channel/>` is a valid, empty feed.
pub(crate) fn normalize(xml: &str) -> Result<(FeedMetadata, Vec<FeedItem>), FormatError> {
    let tree = parse_tree(xml, &TREE_OPTIONS)?;
    let rss = tree.get("rss").ok_or(FormatError::MissingRoot("rss"))?;
    let channel = rss
        .get("channel")
        .ok_or(FormatError::MissingRoot("rss.channel"))?;

    let mut metadata = FeedMetadata::default();
    let mut items = Vec::new();

    for (name, value) in entries(channel) {
        let Some(field) = lookup(CHANNEL_FIELDS, name) else {
            continue;
        };
        match field {
            ChannelField::Title => metadata.title = text(value),
            ChannelField::Link => metadata.link = text(value),
            ChannelField::Description => metadata.description = text(value),
            ChannelField::Language => metadata.language = text(value),
            ChannelField::Copyright => metadata.copyright = text(value),
            ChannelField::ManagingEditor => metadata.managing_editor = text(value),
            ChannelField::WebMaster => metadata.web_master = text(value),
            ChannelField::PubDate => metadata.pub_date = text(value),
            ChannelField::LastBuildDate => metadata.last_build_date = text(value),
            ChannelField::Generator => metadata.generator = text(value).map(FeedGenerator::Name),
            ChannelField::Rating => metadata.rating = text(value),
            ChannelField::Docs => metadata.docs = text(value),
            ChannelField::Cloud => {
                metadata.cloud = Some(Cloud {
                    domain: attribute(value, "domain"),
                    port: attribute(value, "port"),
                    path: attribute(value, "path"),
                    register_procedure: attribute(value, "registerProcedure"),
                    protocol: attribute(value, "protocol"),
                })
            }
            ChannelField::Category => metadata.categories = categories(value),
            ChannelField::Ttl => metadata.ttl = text(value).as_deref().and_then(parse_number),
            ChannelField::Image => {
                metadata.image = Some(Image {
                    url: child_text(value, "url"),
                    title: child_text(value, "title"),
                    link: child_text(value, "link"),
                    description: child_text(value, "description"),
                    width: child_text(value, "width").as_deref().and_then(parse_number),
                    height: child_text(value, "height").as_deref().and_then(parse_number),
                })
            }
            ChannelField::TextInput => {
                metadata.text_input = Some(TextInput {
                    name: child_text(value, "name"),
                    title: child_text(value, "title"),
                    link: child_text(value, "link"),
                    description: child_text(value, "description"),
                })
            }
            ChannelField::SkipHours => {
                metadata.skip_hours = repeated_children(value, "hour")
                    .filter_map(|hour| parse_number(&hour))
                    .collect()
            }
            ChannelField::SkipDays => metadata.skip_days = repeated_children(value, "day").collect(),
            ChannelField::Item => items.extend(occurrences(value).map(normalize_item)),
        }
    }

    Ok((metadata, items))
}

fn normalize_item(node: &Value) -> FeedItem {
    let mut item = FeedItem::default();
    for (name, value) in entries(node) {
        let Some(field) = lookup(ITEM_FIELDS, name) else {
            continue;
        };
        match field {
            ItemField::Title => item.title = text(value),
            ItemField::Link => item.link = text(value),
            ItemField::Description => item.description = text(value),
            ItemField::Author => item.author = text(value),
            ItemField::Comments => item.comments = text(value),
            ItemField::Guid => item.guid = text(value),
            ItemField::PubDate => item.pub_date = text(value),
            ItemField::Enclosure => {
                item.enclosure = Some(Enclosure {
                    url: attribute(value, "url"),
                    length: attribute(value, "length"),
                    media_type: attribute(value, "type"),
                })
            }
            ItemField::Source => {
                item.source = Some(ItemSource {
                    url: attribute(value, "url"),
                    name: text(value).filter(|name| !name.is_empty()),
                })
            }
            ItemField::Category => item.categories = categories(value),
        }
    }
    item
}

/// An attribute-only `<category domain="…"/>` is kept with an empty term.
fn categories(value: &Value) -> Vec<Category> {
    occurrences(value)
        .map(|category| Category {
            term: text(category).unwrap_or_default(),
            domain: attribute(category, "domain"),
            ..Default::default()
        })
        .collect()
}

fn repeated_children<'a>(value: &'a Value, name: &str) -> impl Iterator<Item = String> + 'a {
    value
        .get(name)
        .into_iter()
        .flat_map(occurrences)
        .filter_map(text)
}

fn parse_number(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}
