//! Integration tests: full streams written to and read from files
//!
//! These tests go through the framing layer the way an application would:
//!   BlockTree → Dumper → file → Loader → BlockTree

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::fs::File;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    use crate::config::SerializationConfig;
    use crate::core::block::Library;
    use crate::core::tree::BlockTree;
    use crate::core::value::Value;
    use crate::core::BlockId;
    use crate::serialization::header::{FileHeader, StreamVersion, KORE_SIGNATURE};
    use crate::serialization::progress::CancellationToken;
    use crate::serialization::{
        CodecError, DeflateStatus, Dumper, InflateStatus, Loader, StreamError,
    };
    use crate::tests::example_blocks::{example_registry, Folder, Leaf, Sensor};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Project {
        title: String,
        revision: u32,
    }

    /// Root library → [Folder "Docs" → [Leaf "readme", Sensor], Leaf "notes"]
    fn build_document(tree: &mut BlockTree) -> BlockId {
        let root = tree.create::<Library>().unwrap();
        tree.set_serializable(root, true).unwrap();

        let folder = tree.create::<Folder>().unwrap();
        tree.get_mut::<Folder>(folder).unwrap().title = "Docs".into();
        let readme = tree.create::<Leaf>().unwrap();
        tree.get_mut::<Leaf>(readme).unwrap().name = "readme".into();
        let sensor = tree.create::<Sensor>().unwrap();
        {
            let sensor = tree.get_mut::<Sensor>(sensor).unwrap();
            sensor.label = "inlet".into();
            sensor.level = 0.5;
            sensor.history = vec![Value::Double(0.25), Value::Double(0.5)];
        }
        tree.add(folder, readme).unwrap();
        tree.add(folder, sensor).unwrap();

        let notes = tree.create::<Leaf>().unwrap();
        tree.get_mut::<Leaf>(notes).unwrap().name = "notes".into();

        tree.add(root, folder).unwrap();
        tree.add(root, notes).unwrap();
        root
    }

    #[test]
    fn test_file_round_trip_with_metadata() -> anyhow::Result<()> {
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);
        let project = Project {
            title: "Plant".into(),
            revision: 3,
        };
        let config = SerializationConfig::default().with_sub_profile(0x5052_4a31, 2);

        let file = tempfile::tempfile()?;
        let mut dumper = Dumper::with_json_metadata(file, config.clone(), &project)?;
        assert_eq!(dumper.dump(&tree, root, None)?, DeflateStatus::Success);
        let mut file = dumper.finish()?;
        file.seek(SeekFrom::Start(0))?;

        let mut loader = Loader::new(file, config)?;
        assert!(loader.is_valid());
        assert_eq!(loader.header().signature, KORE_SIGNATURE);
        assert_eq!(loader.header().format_version, StreamVersion::CURRENT.as_u32());
        assert_eq!(loader.header().sub_profile_signature, 0x5052_4a31);
        assert_eq!(loader.header().sub_profile_version, 2);
        assert_eq!(loader.metadata_json::<Project>()?, project);

        let mut rebuilt = BlockTree::new(example_registry());
        let copy = loader
            .load(&mut rebuilt, None)?
            .block()
            .ok_or_else(|| anyhow::anyhow!("load was canceled"))?;

        assert_eq!(rebuilt.total_size(copy), 4);
        let folder = rebuilt.child_at(copy, 0).unwrap();
        assert_eq!(rebuilt.get::<Folder>(folder).unwrap().title, "Docs");
        let readme = rebuilt.child_at(folder, 0).unwrap();
        assert_eq!(rebuilt.get::<Leaf>(readme).unwrap().name, "readme");
        let sensor = rebuilt.child_at(folder, 1).unwrap();
        let sensor = rebuilt.get::<Sensor>(sensor).unwrap();
        assert_eq!(sensor.label, "inlet");
        assert_eq!(sensor.history, vec![Value::Double(0.25), Value::Double(0.5)]);
        let notes = rebuilt.child_at(copy, 1).unwrap();
        assert_eq!(rebuilt.get::<Leaf>(notes).unwrap().name, "notes");
        Ok(())
    }

    #[test]
    fn test_named_file_is_readable_after_drop() {
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.kore");

        {
            let file = File::create(&path).unwrap();
            let mut dumper = Dumper::new(file, SerializationConfig::default()).unwrap();
            dumper.dump(&tree, root, None).unwrap();
            // Dropped without finish: the header is still rewritten.
        }

        let mut bytes = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"KORE");

        let mut loader = Loader::new(File::open(&path).unwrap(), SerializationConfig::default()).unwrap();
        assert!(loader.metadata().is_empty());
        let mut rebuilt = BlockTree::new(example_registry());
        let copy = loader.load(&mut rebuilt, None).unwrap().block().unwrap();
        assert_eq!(rebuilt.total_size(copy), tree.total_size(root));
    }

    #[test]
    fn test_stream_after_caller_prefix() {
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);

        let mut sink = Cursor::new(Vec::new());
        sink.write_all(b"container header").unwrap();
        let mut dumper = Dumper::new(sink, SerializationConfig::default()).unwrap();
        dumper.dump(&tree, root, None).unwrap();
        let mut sink = dumper.finish().unwrap();

        sink.seek(SeekFrom::Start(16)).unwrap();
        let mut loader = Loader::new(sink, SerializationConfig::default()).unwrap();
        let mut rebuilt = BlockTree::new(example_registry());
        assert!(loader.load(&mut rebuilt, None).unwrap().block().is_some());
    }

    #[test]
    fn test_load_canceled_by_token() {
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);
        let mut dumper = Dumper::new(Cursor::new(Vec::new()), SerializationConfig::default()).unwrap();
        dumper.dump(&tree, root, None).unwrap();
        let mut stream = dumper.finish().unwrap();
        stream.set_position(0);

        let token = CancellationToken::new();
        token.cancel();
        let mut callback = token.clone();

        let mut loader = Loader::new(stream, SerializationConfig::default()).unwrap();
        let mut rebuilt = BlockTree::new(example_registry());
        let status = loader.load(&mut rebuilt, Some(&mut callback)).unwrap();
        assert_eq!(status, InflateStatus::Canceled);
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_load_unknown_type_reports_codec_failure() {
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);
        let mut dumper = Dumper::new(Cursor::new(Vec::new()), SerializationConfig::default()).unwrap();
        dumper.dump(&tree, root, None).unwrap();
        let mut stream = dumper.finish().unwrap();
        stream.set_position(0);

        let mut loader = Loader::new(stream, SerializationConfig::default()).unwrap();
        let mut rebuilt = BlockTree::new(crate::core::BlockRegistry::with_builtins().unwrap());
        let result = loader.load(&mut rebuilt, None);
        assert!(matches!(
            result,
            Err(StreamError::Codec(CodecError::UnknownBlockType(_)))
        ));
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_foreign_encoding_version_is_refused() {
        let header = FileHeader {
            host_encoding_version: 7,
            ..FileHeader::default()
        };
        let stream = Cursor::new(header.to_bytes().to_vec());
        let mut loader = Loader::new(stream, SerializationConfig::default()).unwrap();
        let mut tree = BlockTree::new(example_registry());
        assert!(matches!(
            loader.load(&mut tree, None),
            Err(StreamError::UnsupportedEncoding(7))
        ));
    }

    #[test]
    fn test_config_from_json_drives_the_codec() {
        let config = SerializationConfig::from_json_str(r#"{ "max_depth": 2 }"#).unwrap();
        let mut tree = BlockTree::new(example_registry());
        let root = build_document(&mut tree);

        // Root → folder → leaf needs three levels.
        let mut dumper = Dumper::new(Cursor::new(Vec::new()), config.clone()).unwrap();
        assert!(matches!(
            dumper.dump(&tree, root, None),
            Err(StreamError::Codec(CodecError::DepthExceeded(2)))
        ));

        let mut dumper = Dumper::new(Cursor::new(Vec::new()), SerializationConfig::default()).unwrap();
        dumper.dump(&tree, root, None).unwrap();
        let mut stream = dumper.finish().unwrap();
        stream.set_position(0);

        let mut loader = Loader::new(stream, config).unwrap();
        let mut rebuilt = BlockTree::new(example_registry());
        assert!(matches!(
            loader.load(&mut rebuilt, None),
            Err(StreamError::Codec(CodecError::DepthExceeded(2)))
        ));
        assert!(rebuilt.is_empty());
    }
}
