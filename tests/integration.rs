//! End-to-end integration tests for the x3ml engine.
//!
//! These tests load mapping and policy documents from their XML syntax, run
//! them over source documents and check the serialized output, validating that
//! the loaders, generators, engine and graph store work together.

use x3ml::config::EngineConfig;
use x3ml::engine::Engine;
use x3ml::generator::policy_loader::load_policy;
use x3ml::generator::{GeneratedValue, GeneratorPolicy};
use x3ml::graph::OutputFormat;
use x3ml::model::loader::{load_mapping, load_mapping_file};
use x3ml::model::namespace::{RDFS_LABEL, SKOS_PREF_LABEL};
use x3ml::terminology::SkosTerminology;

const CRM: &str = "http://www.cidoc-crm.org/cidoc-crm/";

const MAPPING: &str = r#"<x3ml>
  <namespaces>
    <namespace prefix="crm" uri="http://www.cidoc-crm.org/cidoc-crm/"/>
    <namespace prefix="ex" uri="http://example.org/"/>
  </namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>/museum/object</source_node>
        <target_node>
          <entity>
            <type>crm:E22_Human-Made_Object</type>
            <instance_generator name="ObjectURI">
              <arg name="id" type="xpath">@id</arg>
            </instance_generator>
            <label_generator name="prefLabel">
              <arg name="text" type="xpath">title/text()</arg>
            </label_generator>
          </entity>
        </target_node>
      </domain>
      <link>
        <path>
          <source_relation><relation>maker</relation></source_relation>
          <target_relation><relationship>crm:P108i_was_produced_by</relationship>
            <entity><type>crm:E12_Production</type><instance_generator name="UUID"/></entity>
            <relationship>crm:P14_carried_out_by</relationship>
          </target_relation>
        </path>
        <range>
          <source_node>maker</source_node>
          <target_node>
            <entity>
              <type>crm:E39_Actor</type>
              <instance_generator name="ActorURI">
                <arg name="name" type="xpath">text()</arg>
              </instance_generator>
              <label_generator name="Names">
                <arg name="text" type="xpath">text()</arg>
              </label_generator>
            </entity>
          </target_node>
        </range>
      </link>
      <link>
        <path>
          <source_relation><relation>keyword</relation></source_relation>
          <target_relation><relationship>crm:P3_has_note</relationship></target_relation>
        </path>
        <range>
          <source_node>keyword</source_node>
          <target_node>
            <if><not><if><equals value="draft">@status</equals></if></not></if>
            <entity>
              <type>rdfs:Literal</type>
              <instance_generator name="Literal">
                <arg name="text" type="xpath">text()</arg>
                <arg name="language" type="constant">en</arg>
              </instance_generator>
            </entity>
          </target_node>
        </range>
      </link>
    </mapping>
  </mappings>
</x3ml>"#;

const POLICY: &str = r#"<generator_policy>
  <generator name="ObjectURI" prefix="ex"><pattern>object/{id}</pattern></generator>
  <generator name="ActorURI" prefix="ex" shorten="yes"><pattern>actor/{name}</pattern></generator>
  <generator name="Names">
    <custom generatorClass="gr.forth.ConcatMultipleTerms">
      <set-arg name="text" type="xpath"/>
    </custom>
  </generator>
</generator_policy>"#;

const SOURCE: &str = r#"<museum xml:lang="en">
  <object id="17">
    <title>Mona Lisa</title>
    <maker>Leonardo</maker>
    <keyword>portrait</keyword>
    <keyword status="draft">unsure</keyword>
  </object>
</museum>"#;

fn engine() -> Engine {
    Engine::new(load_mapping(MAPPING).unwrap(), load_policy(POLICY).unwrap())
        .with_config(EngineConfig::deterministic(2))
}

#[test]
fn end_to_end_from_documents() {
    let report = engine().execute_str(SOURCE).unwrap();
    assert!(report.is_complete(), "{:?}", report.diagnostics);
    let graph = &report.graph;
    let object = "http://example.org/object/17";

    assert!(graph.contains(object, SKOS_PREF_LABEL, &GeneratedValue::literal("Mona Lisa", Some("en".into()))));

    let productions = graph.objects(object, &format!("{CRM}P108i_was_produced_by"));
    assert_eq!(productions, vec!["uuid:AA"]);
    let actors = graph.objects(&productions[0], &format!("{CRM}P14_carried_out_by"));
    assert_eq!(actors.len(), 1);
    assert!(actors[0].starts_with("http://example.org/"));
    assert!(graph.contains(&actors[0], RDFS_LABEL, &GeneratedValue::literal("Leonardo", Some("en".into()))));

    assert_eq!(graph.objects(object, &format!("{CRM}P3_has_note")), vec!["portrait"]);
    assert_eq!(report.stats.links_attempted, 2);
}

#[test]
fn shortened_uris_are_stable() {
    let first = engine().execute_str(SOURCE).unwrap();
    let second = engine().execute_str(SOURCE).unwrap();
    let actor = format!("{CRM}E39_Actor");
    assert_eq!(first.graph.subjects_of_type(&actor), second.graph.subjects_of_type(&actor));
}

#[test]
fn serializes_in_every_format() {
    let report = engine().execute_str(SOURCE).unwrap();
    for format in [
        OutputFormat::RdfXml,
        OutputFormat::Turtle,
        OutputFormat::NTriples,
        OutputFormat::NQuads,
        OutputFormat::TriG,
    ] {
        let text = report.graph.to_string_in(format).unwrap();
        assert!(text.contains("Mona Lisa"), "{format}");
    }
    let turtle = report.graph.to_string_in(OutputFormat::Turtle).unwrap();
    assert!(turtle.contains("crm:E22_Human-Made_Object") || turtle.contains("E22_Human-Made_Object"));
}

#[test]
fn association_table_exports_json() {
    let report = engine().execute_str(SOURCE).unwrap();
    assert_eq!(
        report.associations.values_for("/museum[1]/object[1]"),
        vec!["http://example.org/object/17"]
    );
    let json: serde_json::Value = serde_json::from_str(&report.associations.to_json().unwrap()).unwrap();
    assert!(json.as_array().is_some_and(|entries| !entries.is_empty()));
}

#[test]
fn mapping_and_config_files_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let mapping_path = dir.path().join("mapping.x3ml");
    std::fs::write(&mapping_path, MAPPING).unwrap();
    let config_path = dir.path().join("x3ml.toml");
    EngineConfig {
        uuid_test_size: Some(3),
        output_format: OutputFormat::NTriples,
        ..Default::default()
    }
    .save(&config_path)
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    assert_eq!(config.output_format, OutputFormat::NTriples);
    let engine = Engine::new(load_mapping_file(&mapping_path).unwrap(), load_policy(POLICY).unwrap())
        .with_config(config);
    let report = engine.execute_str(SOURCE).unwrap();
    assert_eq!(
        report.graph.objects("http://example.org/object/17", &format!("{CRM}P108i_was_produced_by")),
        vec!["uuid:AAA"]
    );
}

#[test]
fn missing_mapping_file_is_a_load_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_mapping_file(&dir.path().join("absent.x3ml")).unwrap_err();
    assert!(err.to_string().contains("absent.x3ml"));
}

#[test]
fn skos_terminology_drives_conditions() {
    let vocabulary = r#"
@prefix skos: <http://www.w3.org/2004/02/skos/core#> .
@prefix ex: <http://example.org/> .
ex:portrait skos:prefLabel "portrait" ; skos:broader ex:painting .
ex:painting skos:prefLabel "painting" .
"#;
    let mapping = r#"<x3ml>
  <namespaces><namespace prefix="crm" uri="http://www.cidoc-crm.org/cidoc-crm/"/></namespaces>
  <mappings><mapping>
    <domain>
      <source_node>//object</source_node>
      <target_node>
        <if><narrower value="painting">@kind</narrower></if>
        <entity><type>crm:E22_Human-Made_Object</type><instance_generator name="UUID"/></entity>
      </target_node>
    </domain>
  </mapping></mappings>
</x3ml>"#;
    let terminology = SkosTerminology::parse(vocabulary, oxigraph::io::RdfFormat::Turtle).unwrap();
    let engine = Engine::new(load_mapping(mapping).unwrap(), GeneratorPolicy::default())
        .with_config(EngineConfig::deterministic(2))
        .with_terminology(terminology);
    let report = engine
        .execute_str(r#"<r><object kind="painting"/><object kind="coin"/><object kind="portrait"/></r>"#)
        .unwrap();
    assert_eq!(report.graph.subjects_of_type(&format!("{CRM}E22_Human-Made_Object")).len(), 2);
    assert_eq!(report.stats.domains_filtered, 1);
}
