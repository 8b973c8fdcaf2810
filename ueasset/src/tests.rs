use crate::archive::{ArchiveReader, ArchiveWriter, Reader, Writer};
use crate::asset::ASSET_MAGIC;
use crate::context::{Context, Names};
use crate::object::{CategoryObject, DataTable, DataTableRow, NormalObject};
use crate::ogg::{self, OggError, OggMapEntry};
use crate::pak::{CompressionBlock, EntryPayload, EntryRecord, Pak, PakEntry, PakFooter};
use crate::property::{
    read_properties, write_properties, ArrayBody, ArrayStructTag, ArrayValue, ByteData,
    ByteValue, EnumValue, InlineObject, MapBody, MapEntry, MapValue, ObjectRef, SoftObjectRef,
    StructBody, StructItem, StructValue, Text, TextHistory,
};
use crate::*;

const NAMES: &[&str] = &[
    "None",
    "Object",
    "DataTable",
    "Foo",
    "RowStruct",
    "ObjectProperty",
    "Title",
    "StrProperty",
    "Score",
    "IntProperty",
    "Mystery",
    "MysteryProperty",
    "Tags",
    "ArrayProperty",
    "Position",
    "StructProperty",
    "Vector",
    "Pair",
    "PairStruct",
    "Other",
    "Flag",
    "BoolProperty",
    "/Script/Engine",
    "Class",
    "ScriptStruct",
    "Row_1",
    "Row_2",
    "SongTemplate",
];

fn name(names: &NameTable, value: &str) -> FName {
    FName::new(names.find(value).unwrap())
}

fn prop(names: &NameTable, property: &str, ty: &str, value: PropertyValue) -> Property {
    Property::new(name(names, property), name(names, ty), value)
}

fn properties_struct(names: &NameTable, ty: &str, properties: Vec<Property>) -> StructValue {
    StructValue {
        struct_type: Some(name(names, ty)),
        guid: FGuid::default(),
        body: StructBody::Items(vec![StructItem::Properties(properties)]),
    }
}

fn vector_bytes() -> Vec<u8> {
    [1.0f32, 2.0, 3.0]
        .iter()
        .flat_map(|f| f.to_le_bytes())
        .collect()
}

fn normal_object(names: &NameTable) -> NormalObject {
    NormalObject {
        properties: vec![
            prop(names, "Title", "StrProperty", PropertyValue::Str("Hello".into())),
            prop(names, "Score", "IntProperty", PropertyValue::Int(42)),
            prop(
                names,
                "Mystery",
                "MysteryProperty",
                PropertyValue::Unknown(vec![1, 2, 3, 4, 5]),
            ),
            prop(
                names,
                "Tags",
                "ArrayProperty",
                PropertyValue::Array(ArrayValue {
                    inner_type: name(names, "IntProperty"),
                    struct_tag: None,
                    body: ArrayBody::Values(vec![
                        PropertyValue::Int(1),
                        PropertyValue::Int(2),
                        PropertyValue::Int(3),
                    ]),
                }),
            ),
            prop(
                names,
                "Position",
                "StructProperty",
                PropertyValue::Struct(StructValue {
                    struct_type: Some(name(names, "Vector")),
                    guid: FGuid::default(),
                    body: StructBody::Raw(vector_bytes()),
                }),
            ),
            prop(
                names,
                "Pair",
                "StructProperty",
                PropertyValue::Struct(properties_struct(
                    names,
                    "PairStruct",
                    vec![
                        prop(names, "Score", "IntProperty", PropertyValue::Int(1)),
                        prop(names, "Other", "IntProperty", PropertyValue::Int(2)),
                    ],
                )),
            ),
            prop(names, "Flag", "BoolProperty", PropertyValue::Bool(true)),
        ],
    }
}

fn row(names: &NameTable, row: &str, score: i32) -> DataTableRow {
    DataTableRow {
        name: names.find(row).unwrap(),
        duplicate_id: 0,
        value: properties_struct(
            names,
            "Foo",
            vec![prop(names, "Score", "IntProperty", PropertyValue::Int(score))],
        ),
    }
}

fn data_table(names: &NameTable) -> DataTable {
    DataTable {
        base: NormalObject {
            properties: vec![prop(
                names,
                "RowStruct",
                "ObjectProperty",
                PropertyValue::Object(ObjectRef {
                    link: 1,
                    inline: None,
                }),
            )],
        },
        row_struct: names.find("Foo").unwrap(),
        reserved: 0,
        rows: vec![row(names, "Row_1", 7), row(names, "Row_2", 9)],
    }
}

fn header() -> AssetHeader {
    let names: NameTable = NAMES.iter().collect();
    let mut links = LinkTable::new();
    links.push(Link {
        package: name(&names, "/Script/Engine"),
        class: name(&names, "Class"),
        parent: 0,
        name: name(&names, "DataTable"),
    });
    links.push(Link {
        package: name(&names, "/Script/Engine"),
        class: name(&names, "ScriptStruct"),
        parent: 0,
        name: name(&names, "Foo"),
    });
    let engine = EngineVersion {
        major: 4,
        minor: 25,
        patch: 0,
        changelist: 0,
        branch: "++UE4+Release-4.25".into(),
    };
    AssetHeader {
        legacy_file_version: -7,
        file_version_ue4: 518,
        custom_versions: vec![CustomVersion {
            key: FGuid::new(1, 2, 3, 4),
            version: 3,
        }],
        folder_name: "None".into(),
        package_flags: 0x8000_0000,
        guid: FGuid::new(0xDEADBEEF, 0, 0, 1),
        generations: vec![Generation::default()],
        saved_by: engine.clone(),
        compatible_with: engine,
        preload_dependency_offset: HeaderOffset::Registry(4),
        categories: vec![
            CategoryEntry {
                class_index: -(names.find("Object").unwrap() + 1),
                object_name: name(&names, "SongTemplate"),
                ..Default::default()
            },
            CategoryEntry {
                class_index: 0,
                object_name: name(&names, "Foo"),
                ..Default::default()
            },
        ],
        depends: vec![vec![], vec![-1]],
        soft_package_references: Some(vec!["/Game/Songs/Template".into()]),
        registry: Some(vec![0; 8]),
        names,
        links,
        ..Default::default()
    }
}

fn fixture() -> Asset {
    let header = header();
    let data = AssetData {
        leading: vec![],
        categories: vec![
            CategoryData {
                object: CategoryObject::Normal(normal_object(&header.names)),
                extra: vec![0xEE, 0xEE],
                padding: vec![],
            },
            CategoryData {
                object: CategoryObject::DataTable(data_table(&header.names)),
                extra: vec![],
                padding: vec![0; 4],
            },
        ],
    };
    Asset { header, data }
}

fn roundtrip(asset: &Asset) -> (Vec<u8>, Asset) {
    let bytes = asset.to_bytes().unwrap();
    let decoded = Asset::from_bytes(&bytes).unwrap();
    assert_eq!(bytes, decoded.to_bytes().unwrap(), "re-encoding changed bytes");
    (bytes, decoded)
}

fn property<'a>(asset: &'a Asset, category: usize, property: &str) -> &'a Property {
    asset.data.categories[category]
        .object
        .base()
        .get(&asset.header.names, property)
        .unwrap()
}

#[test]
fn test_asset_roundtrip() {
    let (bytes, decoded) = roundtrip(&fixture());
    assert_eq!(&bytes[..4], &ASSET_MAGIC.to_le_bytes());
    assert_eq!(&bytes[bytes.len() - 4..], &ASSET_MAGIC.to_le_bytes());
    assert_eq!(decoded.data.categories[0].extra, vec![0xEE, 0xEE]);
    assert_eq!(decoded.data.categories[1].padding, vec![0; 4]);
    assert_eq!(decoded.header.registry, Some(vec![0; 8]));
    assert_eq!(decoded.header.preload_dependency_offset, HeaderOffset::Registry(4));
    assert_eq!(
        decoded.header.soft_package_references,
        Some(vec![FString::from("/Game/Songs/Template")])
    );
    assert_eq!(decoded.header.depends, vec![vec![], vec![-1]]);
}

#[test]
fn test_header_layout_is_recomputed() {
    let asset = fixture();
    let (bytes, decoded) = roundtrip(&asset);
    let (uasset, uexp) = asset.to_pair().unwrap();
    let header = &decoded.header;

    assert_eq!(header.total_header_size as usize, uasset.len());
    assert_eq!(uasset.len() + uexp.len(), bytes.len());
    assert_eq!(header.bulk_data_offset, bytes.len() as i64 - 4);
    assert_eq!(
        header.generations[0],
        Generation {
            category_count: 2,
            name_count: NAMES.len() as i32,
        }
    );

    let first = &header.categories[0];
    let second = &header.categories[1];
    assert_eq!(first.serial_offset, i64::from(header.total_header_size));
    assert_eq!(second.serial_offset, first.serial_offset + first.serial_size);
    assert_eq!(
        second.serial_offset + second.serial_size + 4 + 4,
        bytes.len() as i64
    );
}

#[test]
fn test_asset_pair() {
    let asset = fixture();
    let (uasset, uexp) = asset.to_pair().unwrap();
    let decoded = Asset::from_pair(&uasset, &uexp).unwrap();
    assert_eq!(decoded.to_pair().unwrap(), (uasset, uexp));
    assert_eq!(
        paired_name("Game/DT_Songs.uasset").as_deref(),
        Some("Game/DT_Songs.uexp")
    );
    assert_eq!(
        paired_name("Game/DT_Songs.uexp").as_deref(),
        Some("Game/DT_Songs.uasset")
    );
    assert_eq!(paired_name("Game/notes.txt"), None);
}

#[test]
fn test_property_values() {
    let (_, decoded) = roundtrip(&fixture());
    let names = &decoded.header.names;

    assert_eq!(
        property(&decoded, 0, "Title").value,
        PropertyValue::Str("Hello".into())
    );
    assert_eq!(property(&decoded, 0, "Score").value, PropertyValue::Int(42));
    assert_eq!(property(&decoded, 0, "Score").length, 4);
    assert_eq!(property(&decoded, 0, "Flag").value, PropertyValue::Bool(true));
    assert_eq!(property(&decoded, 0, "Flag").length, 0);

    match &property(&decoded, 0, "Tags").value {
        PropertyValue::Array(array) => {
            assert_eq!(names.get(array.inner_type.index).unwrap(), "IntProperty");
            assert_eq!(
                array.values().unwrap(),
                &[
                    PropertyValue::Int(1),
                    PropertyValue::Int(2),
                    PropertyValue::Int(3)
                ]
            );
        }
        other => panic!("expected array, found {other:?}"),
    }
}

#[test]
fn test_unknown_type_is_opaque() {
    let (_, decoded) = roundtrip(&fixture());
    let mystery = property(&decoded, 0, "Mystery");
    assert_eq!(mystery.length, 5);
    assert_eq!(mystery.value, PropertyValue::Unknown(vec![1, 2, 3, 4, 5]));
}

#[test]
fn test_native_struct_kept_raw() {
    let (_, decoded) = roundtrip(&fixture());
    let position = property(&decoded, 0, "Position");
    assert_eq!(position.length, 12);
    match &position.value {
        PropertyValue::Struct(value) => {
            assert_eq!(value.type_name(&decoded.header.names), Some("Vector"));
            assert_eq!(value.body, StructBody::Raw(vector_bytes()));
        }
        other => panic!("expected struct, found {other:?}"),
    }
}

#[test]
fn test_struct_length_covers_nested_properties() {
    let (_, decoded) = roundtrip(&fixture());
    let pair = property(&decoded, 0, "Pair");
    // two int properties of 29 bytes each plus the terminator
    assert_eq!(pair.length, 66);
    match &pair.value {
        PropertyValue::Struct(value) => {
            let properties = value.properties().unwrap();
            assert_eq!(properties.len(), 2);
            assert_eq!(properties[1].value, PropertyValue::Int(2));
        }
        other => panic!("expected struct, found {other:?}"),
    }
}

#[test]
fn test_data_table_rows() {
    let (_, decoded) = roundtrip(&fixture());
    let names = &decoded.header.names;
    let CategoryObject::DataTable(table) = &decoded.data.categories[1].object else {
        panic!("expected a data table");
    };
    assert_eq!(table.row_struct, names.find("Foo").unwrap());
    assert_eq!(table.rows.len(), 2);
    assert_eq!(names.get(table.rows[0].name).unwrap(), "Row_1");
    assert_eq!(table.rows[0].value.type_name(names), Some("Foo"));
    assert_eq!(
        table.rows[1].value.properties().unwrap()[0].value,
        PropertyValue::Int(9)
    );
    let PropertyValue::Object(row_struct) = &table.base.properties[0].value else {
        panic!("expected an object reference");
    };
    assert_eq!(decoded.link_name(row_struct.link).unwrap(), "Foo");
}

#[test]
fn test_data_table_without_row_struct() {
    let mut asset = fixture();
    if let CategoryObject::DataTable(table) = &mut asset.data.categories[1].object {
        table.base.properties.clear();
    }
    let (_, decoded) = roundtrip(&asset);
    let category = &decoded.data.categories[1];
    assert!(matches!(&category.object, CategoryObject::Normal(object) if object.properties.is_empty()));
    // reserved word, row count and both rows stay behind as extra data
    assert!(category.extra.len() > 8);
    assert_eq!(&category.extra[..8], &[0, 0, 0, 0, 2, 0, 0, 0]);
}

#[test]
fn test_edit_moves_following_categories() {
    let (_, mut decoded) = roundtrip(&fixture());
    let before = decoded.header.categories[1].serial_offset;
    let title = decoded.data.categories[0]
        .object
        .base()
        .properties
        .iter()
        .position(|p| p.value == PropertyValue::Str("Hello".into()))
        .unwrap();
    let CategoryObject::Normal(object) = &mut decoded.data.categories[0].object else {
        panic!("expected a normal object");
    };
    object.properties[title].value = PropertyValue::Str("Hello, world".into());

    let (_, edited) = roundtrip(&decoded);
    assert_eq!(edited.header.categories[1].serial_offset, before + 7);
    assert_eq!(
        property(&edited, 0, "Title").value,
        PropertyValue::Str("Hello, world".into())
    );
    assert!(matches!(
        edited.data.categories[1].object,
        CategoryObject::DataTable(_)
    ));
}

#[test]
fn test_bad_header_magic() {
    let mut bytes = fixture().to_bytes().unwrap();
    bytes[0] ^= 0xFF;
    let err = Asset::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err.error,
        Error::BadMagic {
            what: "asset header",
            ..
        }
    ));
}

#[test]
fn test_bad_payload_magic() {
    let mut bytes = fixture().to_bytes().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let err = Asset::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err.error,
        Error::BadMagic {
            what: "asset footer",
            ..
        }
    ));
}

#[test]
fn test_bad_name_index_reports_category() {
    let mut asset = fixture();
    if let CategoryObject::Normal(object) = &mut asset.data.categories[0].object {
        object.properties[0].name = FName::new(999);
    }
    let bytes = asset.to_bytes().unwrap();
    let err = Asset::from_bytes(&bytes).unwrap_err();
    match err.error {
        Error::Category { index, source, .. } => {
            assert_eq!(index, 0);
            assert!(matches!(*source, Error::NameIndex(999)));
        }
        other => panic!("expected category error, found {other:?}"),
    }
}

#[test]
fn test_bad_class_link() {
    let mut asset = fixture();
    asset.header.categories[0].class_index = 50;
    let bytes = asset.to_bytes().unwrap();
    let err = Asset::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err.error, Error::LinkIndex(50)));
}

#[test]
fn test_category_count_mismatch() {
    let mut asset = fixture();
    asset.data.categories.pop();
    assert!(matches!(
        asset.to_bytes(),
        Err(Error::CategoryCount {
            expected: 2,
            found: 1
        })
    ));
}

#[test]
fn test_link_resolution() {
    let header = header();
    let links = &header.links;
    assert_eq!(links.resolve(-1).unwrap(), 0);
    assert_eq!(links.resolve(-4).unwrap(), 3);
    assert_eq!(
        links.resolve(0).unwrap(),
        header.names.find("DataTable").unwrap()
    );
    assert!(matches!(links.resolve(2), Err(Error::LinkIndex(2))));
    assert_eq!(header.link_name(1).unwrap(), "Foo");
    assert_eq!(header.link_name(-2).unwrap(), "Object");
}

#[test]
fn test_name_table() {
    let mut names: NameTable = ["None", "Title"].iter().collect();
    assert_eq!(names.find("Title"), Some(1));
    assert_eq!(names.find("Missing"), None);
    assert_eq!(names.intern("Title"), 1);
    assert_eq!(names.intern("Score"), 2);
    assert_eq!(names.len(), 3);
    assert_eq!(names.entries()[2], NameEntry::new("Score"));
    assert_eq!(names.get(2).unwrap(), "Score");
    assert!(matches!(names.get(3), Err(Error::NameIndex(3))));
    assert!(matches!(names.get(-1), Err(Error::NameIndex(-1))));
}

#[test]
fn test_new_name_survives_roundtrip() {
    let mut asset = fixture();
    let index = asset.header.names.intern("Caption");
    let ty = asset.header.names.find("StrProperty").unwrap();
    if let CategoryObject::Normal(object) = &mut asset.data.categories[0].object {
        object.properties.push(Property::new(
            FName::new(index),
            FName::new(ty),
            PropertyValue::Str("Ünïcode".into()),
        ));
    }
    let (_, decoded) = roundtrip(&asset);
    assert_eq!(
        property(&decoded, 0, "Caption").value,
        PropertyValue::Str("Ünïcode".into())
    );
    // -(7 + 1) code units, then eight UTF-16 code units
    assert_eq!(property(&decoded, 0, "Caption").length, 4 + 16);
}

#[test]
fn test_serde_json() {
    let (_, decoded) = roundtrip(&fixture());
    let json = serde_json::to_string(&decoded).unwrap();
    let parsed: Asset = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, decoded);
    assert!(json.contains("\"DEADBEEF000000000000000000000001\""));
}

#[test]
fn test_guid() {
    let guid = FGuid::new(0x01234567, 0x89ABCDEF, 0, 1);
    assert_eq!(guid.to_string(), "0123456789ABCDEF0000000000000001");
    assert_eq!(
        FGuid::parse_str("01234567-89ab-cdef-0000-000000000001").unwrap(),
        guid
    );
    assert_eq!("0123456789ABCDEF0000000000000001".parse::<FGuid>().unwrap(), guid);
    assert!(FGuid::parse_str("0123").is_err());
    assert!(FGuid::nil().is_nil());
}

/// Little-endian builder for hand-written buffers.
#[derive(Default)]
struct Buf(Vec<u8>);
impl Buf {
    fn u8(&mut self, value: u8) -> &mut Self {
        self.0.push(value);
        self
    }
    fn i32(&mut self, value: i32) -> &mut Self {
        self.raw(&value.to_le_bytes())
    }
    fn i64(&mut self, value: i64) -> &mut Self {
        self.raw(&value.to_le_bytes())
    }
    fn u64(&mut self, value: u64) -> &mut Self {
        self.raw(&value.to_le_bytes())
    }
    fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.extend_from_slice(bytes);
        self
    }
    /// Name reference with instance number zero
    fn name(&mut self, index: i32) -> &mut Self {
        self.i32(index).i32(0)
    }
    /// Narrow string with its terminator
    fn string(&mut self, value: &str) -> &mut Self {
        self.i32(value.len() as i32 + 1).raw(value.as_bytes()).u8(0)
    }
}

/// Decodes an asset-format property list and checks it encodes back to `bytes`.
fn decode_properties(names: &NameTable, bytes: &[u8]) -> Vec<Property> {
    let links = LinkTable::new();
    let indexed = || Names::Indexed {
        names,
        links: &links,
    };
    let mut ctx = Context::new(Reader::new(bytes), indexed());
    let properties = read_properties(&mut ctx).unwrap();
    assert_eq!(ctx.stream.remaining(), 0);
    let mut out = Context::new(Writer::new(), indexed());
    write_properties(&mut out, &properties).unwrap();
    assert_eq!(out.stream.into_inner(), bytes);
    properties
}

const LIST_NAMES: &[&str] = &[
    "None",
    "Score",
    "IntProperty",
    "Title",
    "StrProperty",
    "Flag",
    "BoolProperty",
    "Kind",
    "ByteProperty",
    "EKind",
    "Bytes",
    "ArrayProperty",
];

#[test]
fn test_hand_built_property_list() {
    let names: NameTable = LIST_NAMES.iter().collect();
    let mut b = Buf::default();
    b.name(1).name(2).i64(4).u8(0).i32(42);
    b.name(3).name(4).i64(10).u8(0).string("Hello");
    // bool value lives in the header, the body is empty
    b.name(5).name(6).i64(0).u8(1).u8(0);
    b.name(0);

    let properties = decode_properties(&names, &b.0);
    assert_eq!(properties.len(), 3);
    assert_eq!(names.get(properties[0].name.index).unwrap(), "Score");
    assert_eq!(properties[0].value, PropertyValue::Int(42));
    assert_eq!(properties[1].length, 10);
    assert_eq!(properties[1].value, PropertyValue::Str("Hello".into()));
    assert_eq!(properties[2].value, PropertyValue::Bool(true));
    assert_eq!(properties[2].id, None);
}

#[test]
fn test_byte_property_widths() {
    let names: NameTable = LIST_NAMES.iter().collect();
    let mut b = Buf::default();
    b.name(7).name(8).i64(1).name(0).u8(0).u8(7);
    b.name(7).name(8).i64(8).name(9).u8(0).u64(5);
    b.name(7).name(8).i64(2).name(0).u8(0).raw(&[1, 2]);
    b.name(10).name(11).i64(7).name(8).u8(0).i32(3).raw(&[4, 5, 6]);
    b.name(0);

    let properties = decode_properties(&names, &b.0);
    let byte = |enum_type: i32, value| {
        PropertyValue::Byte(ByteValue {
            enum_type: FName::new(enum_type),
            value,
        })
    };
    assert_eq!(properties[0].value, byte(0, ByteData::Byte(7)));
    assert_eq!(properties[1].value, byte(9, ByteData::Int(5)));
    assert_eq!(properties[2].value, byte(0, ByteData::Raw(vec![1, 2])));
    let PropertyValue::Array(array) = &properties[3].value else {
        panic!("expected an array");
    };
    assert_eq!(
        array.values().unwrap(),
        &[
            byte(0, ByteData::Byte(4)),
            byte(0, ByteData::Byte(5)),
            byte(0, ByteData::Byte(6))
        ]
    );
}

/// Fixture with properties appended to its first category.
fn with_properties(build: impl FnOnce(&mut NameTable) -> Vec<Property>) -> Asset {
    let mut asset = fixture();
    let properties = build(&mut asset.header.names);
    let CategoryObject::Normal(object) = &mut asset.data.categories[0].object else {
        panic!("expected a normal object");
    };
    object.properties.extend(properties);
    asset
}

fn interned(names: &mut NameTable, property: &str, ty: &str, value: PropertyValue) -> Property {
    Property::new(
        FName::new(names.intern(property)),
        FName::new(names.intern(ty)),
        value,
    )
}

#[test]
fn test_text_histories() {
    let histories = |table| {
        vec![
            TextHistory::None {
                strings: vec!["a".into(), "b".into()],
            },
            TextHistory::Base {
                namespace: "".into(),
                key: "Key".into(),
                source: "Source".into(),
            },
            TextHistory::StringTableEntry {
                table,
                key: "Title".into(),
            },
            TextHistory::Other {
                tag: 3,
                data: vec![1, 2, 3],
            },
        ]
    };
    let asset = with_properties(|names| {
        let table = FName::new(names.intern("ST_Songs"));
        histories(table)
            .into_iter()
            .enumerate()
            .map(|(i, history)| {
                let value = PropertyValue::Text(Text { flags: 2, history });
                interned(names, &format!("Text{i}"), "TextProperty", value)
            })
            .collect()
    });
    let (_, decoded) = roundtrip(&asset);
    let table = FName::new(decoded.header.names.find("ST_Songs").unwrap());
    for (i, history) in histories(table).into_iter().enumerate() {
        assert_eq!(
            property(&decoded, 0, &format!("Text{i}")).value,
            PropertyValue::Text(Text { flags: 2, history })
        );
    }
    // flags, tag, count and two one-character strings
    assert_eq!(property(&decoded, 0, "Text0").length, 4 + 1 + 4 + 6 + 6);
    assert_eq!(property(&decoded, 0, "Text3").length, 4 + 1 + 3);
}

#[test]
fn test_map_values() {
    let mut raw = vec![0, 0, 0, 0, 1, 0, 0, 0];
    raw.extend(vector_bytes());
    raw.extend(7i32.to_le_bytes());
    let asset = with_properties(|names| {
        let int = FName::new(names.intern("IntProperty"));
        let string = FName::new(names.intern("StrProperty"));
        let structure = FName::new(names.intern("StructProperty"));
        let entries = vec![
            MapEntry {
                key: PropertyValue::Int(1),
                value: PropertyValue::Str("one".into()),
            },
            MapEntry {
                key: PropertyValue::Int(2),
                value: PropertyValue::Str("two".into()),
            },
        ];
        vec![
            interned(
                names,
                "Lookup",
                "MapProperty",
                PropertyValue::Map(MapValue {
                    key_type: int,
                    value_type: string,
                    body: MapBody::Entries(entries),
                }),
            ),
            // vector keys cannot be read as property lists
            interned(
                names,
                "Points",
                "MapProperty",
                PropertyValue::Map(MapValue {
                    key_type: structure,
                    value_type: int,
                    body: MapBody::Raw(raw.clone()),
                }),
            ),
        ]
    });
    let (_, decoded) = roundtrip(&asset);

    let lookup = property(&decoded, 0, "Lookup");
    assert_eq!(lookup.length, 8 + 2 * (4 + 8));
    let PropertyValue::Map(map) = &lookup.value else {
        panic!("expected a map");
    };
    assert_eq!(
        map.body,
        MapBody::Entries(vec![
            MapEntry {
                key: PropertyValue::Int(1),
                value: PropertyValue::Str("one".into()),
            },
            MapEntry {
                key: PropertyValue::Int(2),
                value: PropertyValue::Str("two".into()),
            },
        ])
    );
    let PropertyValue::Map(points) = &property(&decoded, 0, "Points").value else {
        panic!("expected a map");
    };
    assert_eq!(points.body, MapBody::Raw(raw));
}

#[test]
fn test_reference_values() {
    let asset = with_properties(|names| {
        let difficulty = FName::new(names.intern("EDifficulty"));
        let hard = FName::new(names.intern("EDifficulty::Hard"));
        let song = names.intern("/Game/Song.Song");
        let verse = FName {
            index: names.intern("Verse"),
            number: 2,
        };
        vec![
            interned(
                names,
                "Difficulty",
                "EnumProperty",
                PropertyValue::Enum(EnumValue {
                    enum_type: difficulty,
                    value: hard,
                }),
            ),
            interned(
                names,
                "Song",
                "SoftObjectProperty",
                PropertyValue::SoftObject(SoftObjectRef {
                    name: song,
                    id: 0x1_0000_0002,
                }),
            ),
            interned(names, "Section", "NameProperty", PropertyValue::Name(verse)),
        ]
    });
    let (_, decoded) = roundtrip(&asset);
    let names = &decoded.header.names;

    let difficulty = property(&decoded, 0, "Difficulty");
    assert_eq!(difficulty.length, 8);
    let PropertyValue::Enum(value) = &difficulty.value else {
        panic!("expected an enum");
    };
    assert_eq!(names.get(value.enum_type.index).unwrap(), "EDifficulty");
    assert_eq!(names.get(value.value.index).unwrap(), "EDifficulty::Hard");

    let song = property(&decoded, 0, "Song");
    assert_eq!(song.length, 4 + 8);
    assert_eq!(
        song.value,
        PropertyValue::SoftObject(SoftObjectRef {
            name: names.find("/Game/Song.Song").unwrap(),
            id: 0x1_0000_0002,
        })
    );

    let section = property(&decoded, 0, "Section");
    assert_eq!(section.length, 8);
    assert_eq!(
        section.value,
        PropertyValue::Name(FName {
            index: names.find("Verse").unwrap(),
            number: 2,
        })
    );
}

#[test]
fn test_guid_and_date_time_structs() {
    let item = |ty: &str| match ty {
        "Guid" => StructItem::Guid(FGuid::new(1, 2, 3, 4)),
        _ => StructItem::DateTime(637_000_000_000_000_000),
    };
    let asset = with_properties(|names| {
        ["Guid", "DateTime"]
            .into_iter()
            .map(|ty| {
                let value = PropertyValue::Struct(StructValue {
                    struct_type: Some(FName::new(names.intern(ty))),
                    guid: FGuid::default(),
                    body: StructBody::Items(vec![item(ty)]),
                });
                interned(names, &format!("{ty}Value"), "StructProperty", value)
            })
            .collect()
    });
    let (_, decoded) = roundtrip(&asset);
    for (ty, length) in [("Guid", 16), ("DateTime", 8)] {
        let property = property(&decoded, 0, &format!("{ty}Value"));
        assert_eq!(property.length, length);
        let PropertyValue::Struct(value) = &property.value else {
            panic!("expected a struct");
        };
        assert_eq!(value.type_name(&decoded.header.names), Some(ty));
        assert_eq!(value.body, StructBody::Items(vec![item(ty)]));
    }
}

fn struct_tag(names: &mut NameTable, name: &str, struct_type: &str) -> ArrayStructTag {
    ArrayStructTag {
        name: FName::new(names.intern(name)),
        type_name: FName::new(names.intern("StructProperty")),
        struct_type: FName::new(names.intern(struct_type)),
        guid: FGuid::default(),
        id: None,
    }
}

#[test]
fn test_array_of_structs() {
    let asset = with_properties(|names| {
        let tag = struct_tag(names, "Pairs", "PairStruct");
        let score = FName::new(names.intern("Score"));
        let int = FName::new(names.intern("IntProperty"));
        let values = (1..=2)
            .map(|i| {
                PropertyValue::Struct(StructValue {
                    struct_type: Some(tag.struct_type),
                    guid: FGuid::default(),
                    body: StructBody::Items(vec![StructItem::Properties(vec![Property::new(
                        score,
                        int,
                        PropertyValue::Int(i),
                    )])]),
                })
            })
            .collect();
        let value = PropertyValue::Array(ArrayValue {
            inner_type: tag.type_name,
            struct_tag: Some(tag),
            body: ArrayBody::Values(values),
        });
        vec![interned(names, "Pairs", "ArrayProperty", value)]
    });
    let (_, decoded) = roundtrip(&asset);
    let names = &decoded.header.names;

    let PropertyValue::Array(array) = &property(&decoded, 0, "Pairs").value else {
        panic!("expected an array");
    };
    let tag = array.struct_tag.as_ref().unwrap();
    assert_eq!(names.get(tag.name.index).unwrap(), "Pairs");
    assert_eq!(names.get(tag.struct_type.index).unwrap(), "PairStruct");
    let values = array.values().unwrap();
    assert_eq!(values.len(), 2);
    let PropertyValue::Struct(second) = &values[1] else {
        panic!("expected a struct element");
    };
    assert_eq!(second.type_name(names), Some("PairStruct"));
    assert_eq!(second.properties().unwrap()[0].value, PropertyValue::Int(2));
}

#[test]
fn test_array_of_native_structs_kept_raw() {
    let asset = with_properties(|names| {
        let tag = struct_tag(names, "Points", "Vector");
        let value = PropertyValue::Array(ArrayValue {
            inner_type: tag.type_name,
            struct_tag: Some(tag),
            body: ArrayBody::Raw {
                count: 1,
                data: vector_bytes(),
            },
        });
        vec![interned(names, "Points", "ArrayProperty", value)]
    });
    let (_, decoded) = roundtrip(&asset);

    let points = property(&decoded, 0, "Points");
    // count, tag names, element length, struct type, GUID and marker, then one element
    assert_eq!(points.length, 4 + 8 + 8 + 8 + 8 + 16 + 1 + 12);
    let PropertyValue::Array(array) = &points.value else {
        panic!("expected an array");
    };
    assert_eq!(
        array.body,
        ArrayBody::Raw {
            count: 1,
            data: vector_bytes(),
        }
    );
    assert_eq!(array.values(), None);
    assert_eq!(property(&decoded, 0, "Flag").value, PropertyValue::Bool(true));
}

#[test]
fn test_leading_payload_bytes() {
    let mut asset = fixture();
    asset.data.leading = vec![0xAB; 3];
    let (bytes, decoded) = roundtrip(&asset);
    let header = &decoded.header;
    let header_size = header.total_header_size as usize;

    assert_eq!(decoded.data.leading, vec![0xAB; 3]);
    assert_eq!(header.categories[0].serial_offset, header_size as i64 + 3);
    assert_eq!(&bytes[header_size..header_size + 3], &[0xAB; 3]);
    assert_eq!(property(&decoded, 0, "Score").value, PropertyValue::Int(42));
}

#[test]
fn test_registry_offsets_follow_header_growth() {
    let mut asset = fixture();
    asset.header.world_tile_info_offset = HeaderOffset::Registry(2);
    let (_, decoded) = roundtrip(&asset);
    assert_eq!(decoded.header.world_tile_info_offset, HeaderOffset::Registry(2));

    let mut grown = decoded.clone();
    grown.header.names.intern("SomethingNew");
    let (_, regrown) = roundtrip(&grown);
    let header = &regrown.header;
    assert_eq!(header.world_tile_info_offset, HeaderOffset::Registry(2));
    assert_eq!(header.preload_dependency_offset, HeaderOffset::Registry(4));
    assert_eq!(header.searchable_names_offset, HeaderOffset::Fixed(0));
    assert_eq!(header.thumbnail_table_offset, HeaderOffset::Fixed(0));
    assert_eq!(header.gatherable_text_offset, HeaderOffset::Fixed(0));
}

fn pak_fixture() -> Pak {
    let asset = fixture();
    let stored = |name: &str, payload| PakEntry {
        name: name.into(),
        record: EntryRecord::default(),
        payload,
    };
    Pak {
        mount_point: "../../../".into(),
        entries: vec![
            stored("Game/DT_Songs.uasset", EntryPayload::Header(asset.header)),
            stored("Game/DT_Songs.uexp", EntryPayload::Asset(asset.data)),
            stored("Game/Orphan.uexp", EntryPayload::Raw(vec![1, 2, 3, 4])),
            stored("Game/notes.txt", EntryPayload::Raw(b"hello".to_vec())),
            PakEntry {
                name: "Game/packed.bin".into(),
                record: EntryRecord {
                    uncompressed_size: 10,
                    compression_method: 1,
                    compression_blocks: vec![CompressionBlock { start: 0, end: 3 }],
                    compression_block_size: 10,
                    ..Default::default()
                },
                payload: EntryPayload::Raw(vec![9, 9, 9]),
            },
        ],
        footer: PakFooter {
            compression_methods: vec!["Zlib".into()],
            ..Default::default()
        },
    }
}

#[test]
fn test_pak_roundtrip() {
    let bytes = pak_fixture().to_bytes().unwrap();
    let pak = Pak::from_bytes(&bytes).unwrap();
    assert_eq!(pak.to_bytes().unwrap(), bytes);

    assert_eq!(pak.mount_point, "../../../");
    assert_eq!(pak.footer.compression_methods, vec!["Zlib".to_string()]);
    assert_eq!(pak.footer.version, 8);
    assert_eq!(pak.entries.len(), 5);

    let asset = Asset::from_bytes(&fixture().to_bytes().unwrap()).unwrap();
    assert_eq!(
        pak.get("Game/DT_Songs.uasset").unwrap().payload,
        EntryPayload::Header(asset.header)
    );
    assert_eq!(
        pak.get("Game/DT_Songs.uexp").unwrap().payload,
        EntryPayload::Asset(asset.data)
    );
    assert_eq!(
        pak.get("Game/Orphan.uexp").unwrap().payload,
        EntryPayload::Raw(vec![1, 2, 3, 4])
    );
    assert_eq!(
        pak.get("Game/packed.bin").unwrap().payload,
        EntryPayload::Raw(vec![9, 9, 9])
    );
}

#[test]
fn test_pak_records() {
    let bytes = pak_fixture().to_bytes().unwrap();
    let pak = Pak::from_bytes(&bytes).unwrap();
    let records: Vec<&EntryRecord> = pak.entries.iter().map(|e| &e.record).collect();

    assert_eq!(records[0].offset, 0);
    for pair in records.windows(2) {
        assert!(pair[1].offset > pair[0].offset + pair[0].size);
    }
    let notes = &pak.get("Game/notes.txt").unwrap().record;
    assert_eq!((notes.size, notes.uncompressed_size), (5, 5));
    let packed = &pak.get("Game/packed.bin").unwrap().record;
    assert_eq!((packed.size, packed.uncompressed_size), (3, 10));
    assert!(!packed.is_stored());
    assert_eq!(packed.compression_blocks, vec![CompressionBlock { start: 0, end: 3 }]);
}

#[test]
fn test_pak_edit_asset() {
    let bytes = pak_fixture().to_bytes().unwrap();
    let mut pak = Pak::from_bytes(&bytes).unwrap();
    let EntryPayload::Asset(data) = &mut pak.get_mut("Game/DT_Songs.uexp").unwrap().payload else {
        panic!("expected a decoded asset");
    };
    let CategoryObject::Normal(object) = &mut data.categories[0].object else {
        panic!("expected a normal object");
    };
    object.properties[1].value = PropertyValue::Int(7);

    let edited = Pak::from_bytes(&pak.to_bytes().unwrap()).unwrap();
    let EntryPayload::Asset(data) = &edited.get("Game/DT_Songs.uexp").unwrap().payload else {
        panic!("expected a decoded asset");
    };
    assert_eq!(
        data.categories[0].object.base().properties[1].value,
        PropertyValue::Int(7)
    );
}

#[test]
fn test_pak_frozen_footer() {
    let pak = Pak {
        footer: PakFooter {
            version: 9,
            frozen_index: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let bytes = pak.to_bytes().unwrap();
    assert_eq!(bytes.len(), 4 + 4 + pak::FOOTER_SIZE);
    assert_eq!(Pak::from_bytes(&bytes).unwrap(), pak);
}

#[test]
fn test_pak_errors() {
    let err = Pak::from_bytes(&[0; 10]).unwrap_err();
    assert!(matches!(err.error, Error::Overrun { .. }));

    let mut bytes = pak_fixture().to_bytes().unwrap();
    let magic = bytes.len() - pak::FOOTER_SIZE + 17;
    bytes[magic] ^= 0xFF;
    let err = Pak::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err.error,
        Error::BadMagic {
            what: "pak footer",
            ..
        }
    ));
}

#[test]
fn test_pak_asset_without_header() {
    let pak = Pak {
        entries: vec![PakEntry {
            name: "Game/Lonely.uexp".into(),
            record: EntryRecord::default(),
            payload: EntryPayload::Asset(AssetData::default()),
        }],
        ..Default::default()
    };
    assert!(matches!(pak.to_bytes(), Err(Error::Entry { .. })));
}

#[test]
fn test_signature() {
    let data: Vec<u8> = (0..70_000u32).map(|i| i as u8).collect();
    let signature = PakSignature::from_pak(&data);
    assert_eq!(signature.chunk_hashes.len(), 2);
    assert_eq!(signature.chunk_hashes[0], crc32fast::hash(&data[..signature::CHUNK_SIZE]));
    assert!(signature.verify(&data));

    let mut tampered = data.clone();
    tampered[69_999] ^= 1;
    assert!(!signature.verify(&tampered));
    assert!(!signature.verify(&data[..60_000]));

    let bytes = signature.to_bytes().unwrap();
    assert_eq!(&bytes[..4], &signature::SIGNATURE_MAGIC.to_le_bytes());
    assert_eq!(PakSignature::from_bytes(&bytes).unwrap(), signature);

    let err = PakSignature::from_bytes(&[0; 16]).unwrap_err();
    assert!(matches!(err.error, Error::BadMagic { .. }));
}

fn save_fixture() -> SaveFile {
    let names: NameTable = ["Score", "IntProperty", "Title", "StrProperty"]
        .iter()
        .collect();
    let mut prefix = b"GVAS".to_vec();
    prefix.resize(48, 0);
    SaveFile {
        prefix,
        struct_name: "/Script/Game.SongSave".into(),
        properties: vec![
            Property::new(FName::new(0), FName::new(1), PropertyValue::Int(12)),
            Property::new(
                FName::new(2),
                FName::new(3),
                PropertyValue::Str("Ünïcode".into()),
            ),
        ],
        extra: vec![0; 4],
        names,
    }
}

#[test]
fn test_save_roundtrip() {
    let bytes = save_fixture().to_bytes().unwrap();
    let save = SaveFile::from_bytes(&bytes).unwrap();
    assert_eq!(save.to_bytes().unwrap(), bytes);

    assert_eq!(save.struct_name, "/Script/Game.SongSave");
    assert_eq!(save.extra, vec![0; 4]);
    assert_eq!(save.names.get(save.properties[0].name.index).unwrap(), "Score");
    assert_eq!(save.properties[0].value, PropertyValue::Int(12));
    assert_eq!(save.properties[1].value, PropertyValue::Str("Ünïcode".into()));
    assert!(save.names.find("None").is_some());
}

#[test]
fn test_save_prefix_length() {
    let mut save = save_fixture();
    save.prefix.truncate(3);
    assert!(matches!(
        save.to_bytes(),
        Err(Error::OutOfRange {
            field: "save prefix length",
            value: 3
        })
    ));
}

/// Save file bytes around a hand-written property list.
fn save_bytes(properties: &[u8]) -> Vec<u8> {
    let mut prefix = b"GVAS".to_vec();
    prefix.resize(48, 0);
    let mut b = Buf::default();
    b.raw(&prefix)
        .string("/Script/Game.SongSave")
        .raw(properties)
        .string("None")
        .i32(0);
    b.0
}

fn save_value<'a>(save: &'a SaveFile, name: &str) -> &'a PropertyValue {
    let index = save.names.find(name).unwrap();
    &save
        .properties
        .iter()
        .find(|p| p.name.index == index)
        .unwrap()
        .value
}

#[test]
fn test_save_byte_property() {
    let mut p = Buf::default();
    p.string("B")
        .string("ByteProperty")
        .i64(8)
        .string("None")
        .u8(0)
        .u64(5);
    let bytes = save_bytes(&p.0);
    let save = SaveFile::from_bytes(&bytes).unwrap();
    assert_eq!(save.to_bytes().unwrap(), bytes);
    assert_eq!(
        save_value(&save, "B"),
        &PropertyValue::Byte(ByteValue {
            enum_type: FName::new(save.names.find("None").unwrap()),
            value: ByteData::Int(5),
        })
    );
}

#[test]
fn test_save_string_storage_is_kept() {
    let mut p = Buf::default();
    // length one holding only the terminator
    p.string("S").string("StrProperty").i64(5).u8(0).i32(1).u8(0);
    p.string("Latin")
        .string("StrProperty")
        .i64(9)
        .u8(0)
        .i32(5)
        .raw(b"caf\xe9\0");
    p.string("Padded")
        .string("StrProperty")
        .i64(8)
        .u8(0)
        .i32(4)
        .raw(b"ab\0x");
    let bytes = save_bytes(&p.0);
    let save = SaveFile::from_bytes(&bytes).unwrap();
    assert_eq!(save.to_bytes().unwrap(), bytes);

    assert_eq!(
        save_value(&save, "S"),
        &PropertyValue::Str(FString {
            value: String::new(),
            encoding: Some(StringEncoding::Narrow),
            trailing: None,
        })
    );
    assert_eq!(
        save_value(&save, "Latin"),
        &PropertyValue::Str(FString {
            value: "caf\u{e9}".into(),
            encoding: Some(StringEncoding::Narrow),
            trailing: None,
        })
    );
    assert_eq!(
        save_value(&save, "Padded"),
        &PropertyValue::Str(FString {
            value: "ab".into(),
            encoding: None,
            trailing: Some(vec![0, b'x']),
        })
    );

    // a freshly built empty string is a bare zero length
    let mut edited = save.clone();
    edited.properties[0].value = PropertyValue::Str("".into());
    assert_eq!(edited.to_bytes().unwrap().len(), bytes.len() - 1);
}

#[test]
fn test_save_inline_references() {
    let mut p = Buf::default();
    p.string("Owner")
        .string("ObjectProperty")
        .i64(4 + 9 + 10)
        .u8(0)
        .i32(-1)
        .string("Type")
        .string("Value");
    p.string("Song")
        .string("SoftObjectProperty")
        .i64(15 + 4)
        .u8(0)
        .string("/Game/Song")
        .i32(3);
    p.string("Label")
        .string("NameProperty")
        .i64(11)
        .u8(0)
        .string("Chorus");
    let bytes = save_bytes(&p.0);
    let save = SaveFile::from_bytes(&bytes).unwrap();
    assert_eq!(save.to_bytes().unwrap(), bytes);

    let find = |name| save.names.find(name).unwrap();
    assert_eq!(
        save_value(&save, "Owner"),
        &PropertyValue::Object(ObjectRef {
            link: -1,
            inline: Some(InlineObject {
                type_name: find("Type"),
                value: find("Value"),
            }),
        })
    );
    assert_eq!(
        save_value(&save, "Song"),
        &PropertyValue::SoftObject(SoftObjectRef {
            name: find("/Game/Song"),
            id: 3,
        })
    );
    assert_eq!(
        save_value(&save, "Label"),
        &PropertyValue::Name(FName::new(find("Chorus")))
    );
}

fn encode_string(value: &FString) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_fstring(value).unwrap();
    writer.into_inner()
}

#[test]
fn test_string_encodings() {
    assert_eq!(encode_string(&"".into()), vec![0; 4]);
    assert_eq!(encode_string(&"Hi".into()), vec![3, 0, 0, 0, b'H', b'i', 0]);
    let wide = encode_string(&"Ωmega".into());
    assert_eq!(&wide[..4], &(-6i32).to_le_bytes());
    assert_eq!(wide.len(), 4 + 12);

    // ASCII text stored wide stays wide
    let mut b = Buf::default();
    b.i32(-3).raw(&[b'H', 0, b'i', 0, 0, 0]);
    let value = Reader::new(&b.0).read_fstring().unwrap();
    assert_eq!(value, "Hi");
    assert_eq!(value.encoding, Some(StringEncoding::Wide));
    assert_eq!(encode_string(&value), b.0);

    // narrow storage cannot hold this character, so the default wide form is used
    let forced = FString {
        value: "Ω".into(),
        encoding: Some(StringEncoding::Narrow),
        trailing: Some(vec![0, 7]),
    };
    assert_eq!(encode_string(&forced), vec![0xFE, 0xFF, 0xFF, 0xFF, 0xA9, 0x03, 0, 0]);

    let odd = FString {
        value: "x".into(),
        encoding: Some(StringEncoding::Wide),
        trailing: Some(vec![0]),
    };
    let mut writer = Writer::new();
    assert!(matches!(
        writer.write_fstring(&odd),
        Err(Error::OutOfRange { .. })
    ));
}

/// LSB-first bit packer for building Vorbis headers.
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}
impl BitWriter {
    fn push(&mut self, value: u64, count: u32) -> &mut Self {
        for i in 0..count {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            *self.bytes.last_mut().unwrap() |= bit << (self.bits % 8);
            self.bits += 1;
        }
        self
    }
    fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.push(b.into(), 8);
        }
        self
    }
}

fn identification(version: u32, channels: u8, blocksizes: (u8, u8)) -> Vec<u8> {
    let mut packet = vec![1];
    packet.extend_from_slice(b"vorbis");
    packet.extend_from_slice(&version.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&44100u32.to_le_bytes());
    packet.extend_from_slice(&[0; 12]);
    packet.push(blocksizes.0 | blocksizes.1 << 4);
    packet.push(1);
    packet
}

fn comment() -> Vec<u8> {
    let mut packet = vec![3];
    packet.extend_from_slice(b"vorbis");
    packet.extend_from_slice(&[0; 8]);
    packet.push(1);
    packet
}

/// One codebook, floor, residue, mapping and mode.
fn setup(window_type: u64) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.push(5, 8).bytes(b"vorbis");
    // codebook: 1 dimension, 2 dense entries, no lookup
    w.push(0, 8).push(0x564342, 24).push(1, 16).push(2, 24);
    w.push(0, 1).push(0, 1).push(0, 5).push(0, 5).push(0, 4);
    // time domain
    w.push(0, 6).push(0, 16);
    // floor 1 without partitions
    w.push(0, 6).push(1, 16).push(0, 5).push(0, 2).push(0, 4);
    // residue 0
    w.push(0, 6).push(0, 16).push(0, 24).push(0, 24).push(0, 24);
    w.push(0, 6).push(0, 8).push(0, 3).push(0, 1);
    // mapping 0
    w.push(0, 6).push(0, 16).push(0, 1).push(0, 1).push(0, 2);
    w.push(0, 8).push(0, 8).push(0, 8);
    // mode
    w.push(0, 6).push(0, 1).push(window_type, 16).push(0, 16).push(0, 8);
    // framing
    w.push(1, 1);
    w.bytes.clone()
}

fn page(granule: i64, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut segments = vec![];
    let mut data = vec![];
    for packet in packets {
        segments.extend(std::iter::repeat(255).take(packet.len() / 255));
        segments.push((packet.len() % 255) as u8);
        data.extend_from_slice(packet);
    }
    let mut page = b"OggS".to_vec();
    page.extend_from_slice(&[0, 0]);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&0x1234u32.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    page.extend_from_slice(&data);
    page
}

fn ogg_stream(id: &[u8], setup: &[u8]) -> Vec<u8> {
    let audio = [0u8];
    let packets: Vec<&[u8]> = (0..200).map(|_| &audio[..]).collect();
    let comment = comment();
    let mut stream = page(0, 0, &[id]);
    stream.extend(page(0, 1, &[&comment[..], setup]));
    stream.extend(page(25_000, 2, &packets));
    stream
}

#[test]
fn test_ogg_identification() {
    let stream = ogg_stream(&identification(0, 2, (8, 11)), &setup(0));
    let id = ogg::identify(&stream).unwrap();
    assert_eq!(id.channels, 2);
    assert_eq!(id.sample_rate, 44100);
    assert_eq!((id.blocksize_0, id.blocksize_1), (8, 11));
}

#[test]
fn test_ogg_map_and_mogg() {
    let stream = ogg_stream(&identification(0, 2, (8, 11)), &setup(0));
    let map = OggMap::from_ogg(&stream).unwrap();
    assert_eq!(map.version, ogg::MAP_VERSION);
    assert_eq!(map.chunk_size, ogg::MAP_CHUNK_SIZE);
    // 25000 samples span two 20000-sample chunks, all within the first seek increment
    assert_eq!(
        map.entries,
        vec![OggMapEntry {
            bytes: 0,
            samples: 0
        }; 2]
    );
    assert_eq!(map.len(), 28);

    let mogg = build_mogg(&stream).unwrap();
    assert_eq!(&mogg[..4], &0xAi32.to_le_bytes());
    assert_eq!(&mogg[4..8], &36i32.to_le_bytes());
    assert_eq!(&mogg[8..36], map.to_bytes().as_slice());
    assert_eq!(&mogg[36..], stream.as_slice());
}

#[test]
fn test_ogg_errors() {
    assert!(matches!(
        OggMap::from_ogg(b"RIFF\0\0\0\0WAVEfmt "),
        Err(OggError::NoCapturePattern(0))
    ));
    assert!(matches!(OggMap::from_ogg(b"OggS\0"), Err(OggError::Read(_))));

    let stream = ogg_stream(&identification(1, 2, (8, 11)), &setup(0));
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::InvalidVersion(1))
    ));
    let stream = ogg_stream(&identification(0, 0, (8, 11)), &setup(0));
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::InvalidChannels)
    ));
    let stream = ogg_stream(&identification(0, 2, (11, 8)), &setup(0));
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::InvalidBlocksize0)
    ));
    let stream = ogg_stream(&identification(0, 2, (8, 14)), &setup(0));
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::InvalidBlocksize1)
    ));
    let stream = ogg_stream(&identification(0, 2, (8, 11)), &setup(1));
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::InvalidMode)
    ));

    let mut not_vorbis = identification(0, 2, (8, 11));
    not_vorbis[1] = b'V';
    let stream = ogg_stream(&not_vorbis, &setup(0));
    assert!(matches!(OggMap::from_ogg(&stream), Err(OggError::NotVorbis)));
}

#[test]
fn test_ogg_packet_too_large() {
    let huge = vec![0; 130 * 255];
    let stream = page(0, 0, &[&huge[..]]);
    assert!(matches!(
        OggMap::from_ogg(&stream),
        Err(OggError::PacketTooLarge)
    ));
}

fn data_tree() -> DtbNode {
    DtbNode::Array(DtbArray {
        node_id: 1,
        unknown: 0,
        children: vec![
            DtbNode::Keyword("song".into()),
            DtbNode::Command(DtbTree {
                node_id: 2,
                children: vec![
                    DtbNode::Name("tempo".into()),
                    DtbNode::Int(120),
                    DtbNode::Float(0.5),
                ],
            }),
            DtbNode::String("Caf\u{e9}".into()),
            DtbNode::Bracketed(DtbTree::default()),
            DtbNode::IfDef("HX_PC".into()),
            DtbNode::Else(0),
            DtbNode::EndIf(0),
            DtbNode::Define("KEYS".into()),
            DtbNode::Include("keys.dta".into()),
            DtbNode::Merge("extra.dta".into()),
            DtbNode::IfNDef("HX_XBOX".into()),
            DtbNode::Unhandled(0),
            DtbNode::Other { tag: 0x42, value: 7 },
        ],
    })
}

#[test]
fn test_dtb_roundtrip() {
    let tree = data_tree();
    let bytes = tree.to_bytes().unwrap();
    // array: tag, node id, child count, unknown word
    assert_eq!(&bytes[..12], &[0x10, 0, 0, 0, 1, 0, 0, 0, 13, 0, 0, 0]);
    // keyword string without a terminator
    assert_eq!(&bytes[12..24], &[5, 0, 0, 0, 4, 0, 0, 0, b's', b'o', b'n', b'g']);
    // subtree: tag, child count, then node id
    assert_eq!(&bytes[24..34], &[0x11, 0, 0, 0, 3, 0, 2, 0, 0, 0]);
    assert_eq!(DtbNode::from_bytes(&bytes).unwrap(), tree);
}

#[test]
fn test_dtb_errors() {
    let bytes = data_tree().to_bytes().unwrap();
    let mut extra = bytes.clone();
    extra.push(0);
    assert!(matches!(
        DtbNode::from_bytes(&extra).unwrap_err().error,
        Error::Other(_)
    ));
    assert!(DtbNode::from_bytes(&bytes[..bytes.len() - 1]).is_err());

    let negative = [2, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
    assert!(matches!(
        DtbNode::from_bytes(&negative).unwrap_err().error,
        Error::OutOfRange { .. }
    ));
    assert!(matches!(
        DtbNode::Name("Ω".into()).to_bytes(),
        Err(Error::OutOfRange {
            field: "data tree string character",
            ..
        })
    ));
}
