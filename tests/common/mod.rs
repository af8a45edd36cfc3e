#![allow(dead_code)]

/// Shared fixture for the integration tests: a small content tree with
/// sites, templates, nodes, documents, tags and references.
use std::sync::Arc;

use infobase::core::{Column, DataType, Value};
use infobase::external::{ExternalColumnSetting, ExternalStorageMode, MemoryFileStorage};
use infobase::metadata::{ObjectDependency, TypeInfo, TypeRegistry};
use infobase::services::{FeatureLicense, MapLocalizer, MemoryCache, MemoryEventLog, MemoryNotifier, PermissionTable};
use infobase::storage::InMemoryProvider;
use infobase::{EngineConfig, InfoObject, InfoSession};

pub const SITE: i64 = 1;

pub struct Fixture {
    pub session: InfoSession,
    pub provider: Arc<InMemoryProvider>,
    pub files: Arc<MemoryFileStorage>,
    pub notifier: Arc<MemoryNotifier>,
    pub cache: Arc<MemoryCache>,
    pub event_log: Arc<MemoryEventLog>,
    pub license: Arc<FeatureLicense>,
    pub permissions: Arc<PermissionTable>,
    pub localizer: Arc<MapLocalizer>,
}

pub fn node_type() -> TypeInfo {
    TypeInfo::new(
        "test.node",
        vec![
            Column::new("NodeID", DataType::Integer),
            Column::new("NodeGUID", DataType::Guid),
            Column::new("NodeName", DataType::Text),
            Column::new("NodeDisplayName", DataType::Text),
            Column::new("NodeParentID", DataType::Integer),
            Column::new("NodeSiteID", DataType::Integer),
            Column::new("NodeTemplateID", DataType::Integer),
            Column::new("NodeLinkedNodeID", DataType::Integer),
            Column::new("NodeIDPath", DataType::Text),
            Column::new("NodeNamePath", DataType::Text),
            Column::new("NodeLevel", DataType::Integer),
            Column::new("NodeOrder", DataType::Integer),
            Column::new("NodeLastModified", DataType::Timestamp),
        ],
    )
    .id_column("NodeID")
    .guid_column("NodeGUID")
    .code_name_column("NodeName")
    .display_name_column("NodeDisplayName")
    .parent("NodeParentID", "test.node")
    .site_id_column("NodeSiteID")
    .id_path_column("NodeIDPath")
    .name_path_column("NodeNamePath")
    .level_column("NodeLevel")
    .order_column("NodeOrder")
    .last_modified_column("NodeLastModified")
    .dependency(ObjectDependency::optional("NodeTemplateID", "test.template"))
    .dependency(ObjectDependency::optional("NodeLinkedNodeID", "test.node"))
    .with_metafiles()
    .supports_locking()
}

pub fn doc_type() -> TypeInfo {
    TypeInfo::new(
        "test.doc",
        vec![
            Column::new("DocID", DataType::Integer),
            Column::new("DocGUID", DataType::Guid),
            Column::new("DocName", DataType::Text),
            Column::new("DocNodeID", DataType::Integer).not_null(),
            Column::new("DocBody", DataType::Text),
            Column::new("DocSummary", DataType::Text),
            Column::new("DocLastModified", DataType::Timestamp),
        ],
    )
    .id_column("DocID")
    .guid_column("DocGUID")
    .code_name_column("DocName")
    .parent("DocNodeID", "test.node")
    .last_modified_column("DocLastModified")
    .with_external_columns(|| {
        vec![
            ExternalColumnSetting::new("DocBody", |values| {
                values.get("DocGUID").as_guid().map(|guid| format!("docs/{}.txt", guid))
            }),
            ExternalColumnSetting::new("DocSummary", |values| {
                values.get("DocGUID").as_guid().map(|guid| format!("docs/{}.summary.txt", guid))
            })
            .mode(ExternalStorageMode::Both),
        ]
    })
}

fn types() -> Vec<TypeInfo> {
    vec![
        TypeInfo::new(
            "test.template",
            vec![
                Column::new("TemplateID", DataType::Integer),
                Column::new("TemplateName", DataType::Text),
                Column::new("TemplateSiteID", DataType::Integer),
            ],
        )
        .id_column("TemplateID")
        .code_name_column("TemplateName")
        .site_id_column("TemplateSiteID"),
        node_type(),
        doc_type(),
        TypeInfo::new(
            "test.comment",
            vec![
                Column::new("CommentID", DataType::Integer),
                Column::new("CommentText", DataType::Text),
                Column::new("CommentNodeID", DataType::Integer),
            ],
        )
        .id_column("CommentID")
        .parent("CommentNodeID", "test.node")
        .license_feature("comments"),
        TypeInfo::new(
            "test.tag",
            vec![
                Column::new("TagID", DataType::Integer),
                Column::new("TagName", DataType::Text),
            ],
        )
        .id_column("TagID")
        .code_name_column("TagName"),
        TypeInfo::new(
            "test.nodetag",
            vec![
                Column::new("NodeTagNodeID", DataType::Integer),
                Column::new("NodeTagTagID", DataType::Integer),
            ],
        )
        .binding("NodeTagNodeID", "test.node")
        .dependency(ObjectDependency::binding("NodeTagTagID", "test.tag")),
        TypeInfo::new(
            "test.link",
            vec![
                Column::new("LinkID", DataType::Integer),
                Column::new("LinkNodeID", DataType::Integer),
            ],
        )
        .id_column("LinkID")
        .dependency(ObjectDependency::required("LinkNodeID", "test.node")),
        TypeInfo::new(
            "test.bookmark",
            vec![
                Column::new("BookmarkID", DataType::Integer),
                Column::new("BookmarkNodeID", DataType::Integer),
            ],
        )
        .id_column("BookmarkID")
        .dependency(ObjectDependency::optional("BookmarkNodeID", "test.node")),
        TypeInfo::new(
            "test.shortcut",
            vec![
                Column::new("ShortcutID", DataType::Integer),
                Column::new("ShortcutNodeID", DataType::Integer),
            ],
        )
        .id_column("ShortcutID")
        .dependency(ObjectDependency::required("ShortcutNodeID", "test.node").with_default(0i64)),
        TypeInfo::new(
            "test.widget",
            vec![
                Column::new("WidgetID", DataType::Integer),
                Column::new("WidgetName", DataType::Text),
                Column::new("WidgetSiteID", DataType::Integer),
                Column::new("WidgetTemplateID", DataType::Integer),
            ],
        )
        .id_column("WidgetID")
        .code_name_column("WidgetName")
        .site_id_column("WidgetSiteID")
        .dependency(ObjectDependency::required("WidgetTemplateID", "test.template")),
        TypeInfo::new(
            "test.setting",
            vec![
                Column::new("SettingID", DataType::Integer),
                Column::new("SettingKey", DataType::Text),
                Column::new("SettingValue", DataType::Text),
            ],
        )
        .id_column("SettingID")
        .with_natural_key(&["SettingKey"])
        .supports_upsert(),
    ]
}

pub fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    for type_info in types() {
        registry.register(type_info).unwrap();
    }
    Arc::new(registry)
}

pub fn fixture() -> Fixture {
    fixture_with_config(EngineConfig::default())
}

pub fn fixture_with_config(config: EngineConfig) -> Fixture {
    let provider = Arc::new(InMemoryProvider::new());
    let files = Arc::new(MemoryFileStorage::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let cache = Arc::new(MemoryCache::new());
    let event_log = Arc::new(MemoryEventLog::new());
    let license = Arc::new(FeatureLicense::new());
    let permissions = Arc::new(PermissionTable::new());
    let localizer = Arc::new(MapLocalizer::new());

    let session = InfoSession::builder()
        .registry(registry())
        .provider(provider.clone())
        .files(files.clone())
        .notifier(notifier.clone())
        .cache(cache.clone())
        .event_log(event_log.clone())
        .license(license.clone())
        .permissions(permissions.clone())
        .localizer(localizer.clone())
        .config(config)
        .build()
        .unwrap();

    Fixture {
        session,
        provider,
        files,
        notifier,
        cache,
        event_log,
        license,
        permissions,
        localizer,
    }
}

pub fn create_node(session: &InfoSession, name: &str, parent: Option<i64>) -> InfoObject {
    create_node_on_site(session, name, parent, SITE)
}

pub fn create_node_on_site(session: &InfoSession, name: &str, parent: Option<i64>, site_id: i64) -> InfoObject {
    let mut node = session.new_object("test.node").unwrap();
    node.set_value("NodeName", name).unwrap();
    node.set_value("NodeDisplayName", name).unwrap();
    node.set_value("NodeSiteID", site_id).unwrap();
    node.set_parent_id(parent).unwrap();
    node.insert(session).unwrap();
    node
}

pub fn create_doc(session: &InfoSession, name: &str, node_id: i64, body: &str) -> InfoObject {
    let mut doc = session.new_object("test.doc").unwrap();
    doc.set_value("DocName", name).unwrap();
    doc.set_value("DocNodeID", node_id).unwrap();
    doc.set_value("DocBody", body).unwrap();
    doc.insert(session).unwrap();
    doc
}

pub fn create_row(session: &InfoSession, object_type: &str, values: &[(&str, Value)]) -> InfoObject {
    let mut object = session.new_object(object_type).unwrap();
    for (column, value) in values {
        object.set_value(column, value.clone()).unwrap();
    }
    object.save(session).unwrap();
    object
}

pub fn id(object: &InfoObject) -> i64 {
    object.object_id().unwrap().unwrap()
}

pub fn reload(session: &InfoSession, object_type: &str, id: i64) -> InfoObject {
    session.get_object(object_type, id).unwrap().unwrap()
}
