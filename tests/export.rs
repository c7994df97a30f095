//! Debug export of rewritten classes.

use std::{fs, sync::Arc};

use classmend::{classfile::code::opcodes::*, prelude::*, transform::export_path};

fn registry(settings: MapSettings) -> Result<PatchRegistry> {
    let mut registry = PatchRegistry::with_settings(Arc::new(settings.with("patch.demo.stub", "true")));
    registry.add(
        PatchDefinition::new("Stub")
            .category("demo")
            .target(TargetSelector::new("org/demo/"))
            .action(
                PatchAction::new(
                    "stub",
                    "stub",
                    Executable::method(|_, method, _| {
                        method.clear_body().instructions.push(Insn::op(RETURN));
                        Ok(())
                    }),
                )
                .method(MethodSelector::new("run", "()V")),
            ),
    )?;
    Ok(registry)
}

fn runnable(name: &str) -> Result<Vec<u8>> {
    ClassBuilder::new(name)
        .interface("java/lang/Runnable")
        .constructor()
        .method(
            MethodAccess::PUBLIC,
            "run",
            "()V",
            [
                Insn::method(INVOKESTATIC, "java/lang/Thread", "yield", "()V"),
                Insn::op(RETURN),
            ],
        )
        .build()
}

/// Rewritten classes land under their package directories, byte for byte.
#[test]
fn test_export_writes_rewritten_class() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transformer = registry(MapSettings::new())?
        .build_transformer()
        .with_config(TransformConfig::with_export(dir.path()));

    let output = transformer
        .transform(None, "org/demo/task/Job", &runnable("org/demo/task/Job")?)?
        .ok_or_else(|| Error::Error("not transformed".into()))?;

    let path = dir.path().join("org").join("demo").join("task").join("Job.class");
    assert_eq!(export_path(dir.path(), "org/demo/task/Job"), path);
    assert_eq!(fs::read(&path)?, output);
    Ok(())
}

/// Export is configured through the same settings as the patches.
#[test]
fn test_export_from_settings() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("dump");
    let settings = MapSettings::new()
        .with("debug.export", "true")
        .with("debug.export-dir", target.to_string_lossy());

    let transformer = registry(settings)?.build_transformer();
    assert!(transformer.config().export);
    assert_eq!(transformer.config().export_dir, target);

    transformer.transform(None, "org/demo/Job", &runnable("org/demo/Job")?)?;
    assert!(target.join("org").join("demo").join("Job.class").is_file());

    // classes that are not rewritten are not exported
    transformer.transform(None, "org/other/Job", &runnable("org/other/Job")?)?;
    assert!(!target.join("org").join("other").exists());
    Ok(())
}

/// A failing export is logged and does not affect the transform.
#[test]
fn test_export_failure_keeps_output() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocked");
    fs::write(&blocker, b"not a directory")?;

    let transformer = registry(MapSettings::new())?
        .build_transformer()
        .with_config(TransformConfig::with_export(&blocker));
    assert!(transformer
        .transform(None, "org/demo/Job", &runnable("org/demo/Job")?)?
        .is_some());
    assert_eq!(fs::read(&blocker)?, b"not a directory");
    Ok(())
}
