//! End-to-end update tests.
//!
//! Each test seeds the session with the descriptor the host last compiled,
//! feeds an edited source through `hot_update` and checks which live modules
//! come back.

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use std::collections::HashMap;
    use std::future::{ready, Ready};
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::cache::DescriptorCache;
    use crate::hmr::{HmrSession, HotUpdate, LiveModule, ModuleGraph};
    use crate::options::PluginOptions;
    use crate::parse::SfcParser;
    use crate::script::ImportScanner;

    const APP: &str = "/app/src/App.vue";
    const MAIN: &str = "/app/src/App.vue";
    const SCRIPT: &str = "/app/src/App.vue?vue&type=script&setup=true&lang.ts";
    const TEMPLATE: &str = "/app/src/App.vue?vue&type=template&lang.js";

    fn style(index: usize) -> String {
        format!("/app/src/App.vue?vue&type=style&index={}&lang.css", index)
    }

    fn session_with(options: PluginOptions) -> HmrSession {
        HmrSession::new(DescriptorCache::new(options, Arc::new(SfcParser)), Arc::new(ImportScanner))
    }

    fn session() -> HmrSession {
        session_with(PluginOptions::new("/app"))
    }

    fn seed(session: &HmrSession, file: &str, source: &str) {
        session.cache().create(Path::new(file), source, false);
        session.cache().create(Path::new(file), source, true);
    }

    fn contents(source: &str) -> impl FnOnce() -> Ready<io::Result<String>> {
        let source = source.to_string();
        move || ready(Ok(source))
    }

    fn modules(urls: &[&str]) -> Vec<Arc<LiveModule>> {
        urls.iter().map(|u| LiveModule::new(*u)).collect()
    }

    fn update(session: &HmrSession, file: &str, live: &[Arc<LiveModule>], source: &str) -> HotUpdate {
        block_on(session.hot_update(Path::new(file), live, contents(source))).unwrap()
    }

    struct StaticGraph(HashMap<PathBuf, Vec<Arc<LiveModule>>>);

    impl ModuleGraph for StaticGraph {
        fn modules_by_file(&self, file: &Path) -> Vec<Arc<LiveModule>> {
            self.0.get(file).cloned().unwrap_or_default()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CLASSIFICATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_markup_text_edit_updates_template_only() {
        let session = session();
        seed(&session, APP, "<template><div>hello</div></template>");
        let live = modules(&[MAIN, TEMPLATE]);

        let result = update(&session, APP, &live, "<template><div>hello world</div></template>");
        assert_eq!(result.urls(), vec![TEMPLATE]);
    }

    #[test]
    fn test_adding_scoped_updates_template_and_main() {
        let session = session();
        seed(&session, APP, "<template><div/></template><style>.a{}</style>");
        let style0 = style(0);
        let live = modules(&[MAIN, TEMPLATE, style0.as_str()]);

        let result = update(&session, APP, &live, "<template><div/></template><style scoped>.a{}</style>");
        let urls = result.urls();
        assert!(urls.contains(&TEMPLATE));
        assert!(urls.contains(&MAIN));
        assert!(urls.contains(&style0.as_str()));
    }

    #[test]
    fn test_removing_trailing_style_reloads_main() {
        let session = session();
        seed(&session, APP, "<template><div/></template><style>.a{}</style><style>.b{}</style>");
        let (style0, style1) = (style(0), style(1));
        let live = modules(&[MAIN, TEMPLATE, style0.as_str(), style1.as_str()]);

        let result = update(&session, APP, &live, "<template><div/></template><style>.a{}</style>");
        assert_eq!(result.urls(), vec![MAIN]);
    }

    #[test]
    fn test_dropped_import_usage_reloads_script() {
        let session = session();
        let before = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><Foo/></template>";
        seed(&session, APP, before);
        let prev = session.cache().get(Path::new(APP), false, true).unwrap().unwrap();
        session.resolve_script(&prev, false);
        let live = modules(&[MAIN, SCRIPT, TEMPLATE]);

        let after = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><div/></template>";
        let urls = update(&session, APP, &live, after).urls().into_iter().map(String::from).collect::<Vec<_>>();
        assert!(urls.contains(&SCRIPT.to_string()));
        assert!(urls.contains(&TEMPLATE.to_string()));
    }

    #[test]
    fn test_markup_edit_keeping_import_usage_reuses_resolved_script() {
        let session = session();
        let before = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><Foo/></template>";
        seed(&session, APP, before);
        let prev = session.cache().get(Path::new(APP), false, true).unwrap().unwrap();
        let resolved = session.resolve_script(&prev, false);
        let live = modules(&[MAIN, SCRIPT, TEMPLATE]);

        let after = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><p><Foo/></p></template>";
        let result = update(&session, APP, &live, after);
        assert_eq!(result.urls(), vec![TEMPLATE]);

        let next = session.cache().get(Path::new(APP), false, true).unwrap().unwrap();
        let reused = session.cache().resolved_script(&next, false).unwrap();
        assert!(Arc::ptr_eq(&resolved, &reused));
    }

    #[test]
    fn test_compiled_entry_is_ready_for_first_edit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("App.vue");
        let before = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><Foo/></template>";
        std::fs::write(&file, before).unwrap();
        let session = session_with(PluginOptions::new(dir.path()));

        let entry = session.compile_entry(&file, before);
        assert!(entry.errors.is_empty());
        let baseline = session.cache().get(&file, false, true).unwrap().unwrap();
        assert!(session.cache().resolved_script(&baseline, false).is_some());

        let main = file.display().to_string();
        let script = format!("{}?vue&type=script&setup=true&lang.ts", main);
        let template = format!("{}?vue&type=template&lang.js", main);
        let live = modules(&[main.as_str(), script.as_str(), template.as_str()]);

        let after = "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><div/></template>";
        let result = block_on(session.hot_update(&file, &live, contents(after))).unwrap();
        assert_eq!(result.urls(), vec![script.as_str(), template.as_str()]);
    }

    #[test]
    fn test_repeated_edits_keep_only_live_resolved_scripts() {
        let session = session();
        let source = |n: usize| {
            format!(
                "<script setup lang=\"ts\">import Foo from './Foo.vue'</script><template><Foo/>{}</template>",
                n
            )
        };
        seed(&session, APP, &source(0));
        let live = modules(&[MAIN, SCRIPT, TEMPLATE]);

        let mut analysed = Vec::new();
        for n in 1..=5 {
            analysed.push(session.cache().get(Path::new(APP), false, true).unwrap().unwrap());
            let result = update(&session, APP, &live, &source(n));
            assert_eq!(result.urls(), vec![TEMPLATE]);
        }

        for old in &analysed {
            assert!(session.cache().resolved_script(old, false).is_none());
        }
        let latest = session.cache().get(Path::new(APP), false, true).unwrap().unwrap();
        assert!(session.cache().resolved_script(&latest, false).is_some());
    }

    #[test]
    fn test_markup_edit_refreshes_css_importers_of_main() {
        let session = session();
        seed(&session, APP, "<template><div class=\"p-2\"/></template>");
        let tailwind = LiveModule::new("/app/src/tailwind.css");
        let main = LiveModule::with_importers(MAIN, vec![tailwind, LiveModule::new("/app/src/main.ts")]);
        let live = vec![main, LiveModule::new(TEMPLATE)];

        let result = update(&session, APP, &live, "<template><div class=\"p-4\"/></template>");
        assert_eq!(result.urls(), vec![TEMPLATE, "/app/src/tailwind.css"]);
    }

    #[test]
    fn test_style_edit_refreshes_css_importers_of_main() {
        let session = session();
        seed(&session, APP, "<template><div/></template><style>.a{}</style>");
        let style0 = style(0);
        let tailwind = LiveModule::new("/app/src/tailwind.css");
        let live = vec![
            LiveModule::with_importers(MAIN, vec![tailwind]),
            LiveModule::new(TEMPLATE),
            LiveModule::new(style0.as_str()),
        ];

        let result = update(&session, APP, &live, "<template><div/></template><style>.a{color:red}</style>");
        assert_eq!(result.urls(), vec![style0.as_str(), "/app/src/tailwind.css"]);
    }

    #[test]
    fn test_inline_markup_reloads_main() {
        let session = session();
        seed(&session, APP, "<template><div>a</div></template>");
        let live = modules(&[MAIN]);

        let result = update(&session, APP, &live, "<template><div>b</div></template>");
        assert_eq!(result.urls(), vec![MAIN]);
    }

    #[test]
    fn test_custom_block_edit_targets_its_module() {
        let session = session();
        seed(&session, APP, "<template><div/></template><i18n>{\"a\":1}</i18n>");
        let i18n = "/app/src/App.vue?vue&type=i18n&index=0&lang.i18n";
        let live = modules(&[MAIN, TEMPLATE, i18n]);

        let result = update(&session, APP, &live, "<template><div/></template><i18n>{\"a\":2}</i18n>");
        assert_eq!(result.urls(), vec![i18n]);

        let result = update(&session, APP, &live, "<template><div/></template>");
        assert_eq!(result.urls(), vec![MAIN]);
    }

    #[test]
    fn test_unchanged_source_updates_nothing() {
        let session = session();
        let source = "<template><div/></template><style>.a{}</style>";
        seed(&session, APP, source);
        let live = modules(&[MAIN, TEMPLATE]);

        let result = update(&session, APP, &live, source);
        assert!(result.urls().is_empty());
        assert!(session.cache().previous(Path::new(APP)).is_none());
        assert!(session.cache().get(Path::new(APP), false, false).unwrap().is_some());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CACHE EFFECTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_unseen_file_is_not_applicable() {
        let session = session();
        let result = update(&session, APP, &modules(&[MAIN]), "<template/>");
        assert!(matches!(result, HotUpdate::NotApplicable));
    }

    #[test]
    fn test_read_failure_propagates() {
        let session = session();
        seed(&session, APP, "<template/>");
        let failing = || ready(Err::<String, _>(io::Error::new(io::ErrorKind::NotFound, "gone")));
        let result = block_on(session.hot_update(Path::new(APP), &[], failing));
        assert!(result.is_err());
    }

    #[test]
    fn test_change_invalidates_current_descriptor() {
        let session = session();
        seed(&session, APP, "<template><div>a</div></template>");
        let compiled = session.cache().get(Path::new(APP), false, false).unwrap().unwrap();

        update(&session, APP, &modules(&[MAIN, TEMPLATE]), "<template><div>b</div></template>");

        assert!(session.cache().get(Path::new(APP), false, false).unwrap().is_none());
        let previous = session.cache().previous(Path::new(APP)).unwrap();
        assert_eq!(previous.revision, compiled.revision);

        // the analysed revision becomes the baseline for the next edit
        let result = update(&session, APP, &modules(&[MAIN, TEMPLATE]), "<template><div>b</div></template>");
        assert!(result.urls().is_empty());
    }

    #[test]
    fn test_included_host_file_keeps_fresh_descriptor() {
        let mut options = PluginOptions::new("/app");
        options.include_extensions = vec!["md".to_string()];
        let session = session_with(options);
        let page = "/app/docs/page.md";
        seed(&session, page, "<template><h1>A</h1></template>");
        let live = modules(&[page, "/app/docs/page.md?vue&type=template&lang.js"]);

        let result = update(&session, page, &live, "<template><h1>B</h1></template>");
        assert_eq!(result.urls(), vec!["/app/docs/page.md?vue&type=template&lang.js"]);

        let current = session.cache().get(Path::new(page), false, false).unwrap().unwrap();
        assert!(current.source.contains("<h1>B</h1>"));
        assert!(session.cache().previous(Path::new(page)).is_none());
        let linked = session.cache().linked_descriptor(Path::new(page), None).unwrap();
        assert_eq!(linked.revision, current.revision);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // WATCHER EVENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_type_dependency_change_reloads_components() {
        let dir = tempfile::tempdir().unwrap();
        let types = dir.path().join("types.ts");
        std::fs::write(&types, "export interface Props {}").unwrap();
        let app = dir.path().join("App.vue");
        let app_url = app.display().to_string();
        let script = format!("{}?vue&type=script&setup=true&lang.ts", app_url);

        let session = session_with(PluginOptions::new(dir.path()));
        let source = "<script setup lang=\"ts\">import type { Props } from './types'\ndefineProps<Props>()</script><template><div/></template>";
        seed(&session, &app_url, source);
        let descriptor = session.cache().get(&app, false, false).unwrap().unwrap();
        session.resolve_script(&descriptor, false);

        // the path exactly as the watcher reports it
        let types_url = types.display().to_string();
        let graph = StaticGraph(HashMap::from([(app.clone(), modules(&[app_url.as_str(), script.as_str()]))]));
        let types_module = modules(&[types_url.as_str()]);
        let result =
            block_on(session.on_file_changed(&types, &types_module, &graph, contents("export interface Props { a: 1 }")))
                .unwrap();

        assert_eq!(result.urls(), vec![types_url.as_str(), script.as_str()]);
        assert!(session.cache().resolved_script(&descriptor, false).is_none());
    }

    #[test]
    fn test_unseen_component_that_is_a_type_dependency_keeps_own_modules() {
        let session = session();
        seed(&session, APP, "<script setup lang=\"ts\">import type { Props } from './Base.vue'</script><template><div/></template>");
        let base = Path::new("/app/src/Base.vue");
        session.type_deps().register(Path::new(APP), &[base.to_path_buf()]);

        let graph = StaticGraph(HashMap::from([(PathBuf::from(APP), modules(&[MAIN, SCRIPT]))]));
        let base_modules = modules(&["/app/src/Base.vue"]);
        let result = block_on(session.on_file_changed(base, &base_modules, &graph, contents("<template/>"))).unwrap();

        // Base.vue was never compiled, so only the type dependency logic applies
        assert_eq!(result.urls(), vec!["/app/src/Base.vue", SCRIPT]);
    }

    #[test]
    fn test_unrelated_file_is_not_applicable() {
        let session = session();
        let graph = StaticGraph(HashMap::new());
        let result = block_on(session.on_file_changed(
            Path::new("/app/src/util.ts"),
            &modules(&["/app/src/util.ts"]),
            &graph,
            contents("export {}"),
        ))
        .unwrap();
        assert!(matches!(result, HotUpdate::NotApplicable));
    }

    #[test]
    fn test_related_file_deletion_drops_links() {
        let session = session();
        seed(&session, APP, "<template><div/></template><style scoped src=\"./app.css\"></style>");
        let owner = session.cache().get(Path::new(APP), false, false).unwrap().unwrap();
        let css = Path::new("/app/src/app.css");
        session.cache().link_external_source(css, owner.clone(), true);
        session.cache().link_external_source(css, owner.clone(), false);
        assert!(session.cache().linked_descriptor(css, Some(&owner.id)).is_ok());

        session.on_related_file_deleted(css);
        assert!(session.cache().linked_descriptor(css, Some(&owner.id)).is_err());
        assert!(session.cache().linked_descriptor(css, None).is_err());
    }
}
