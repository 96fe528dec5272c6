//! Behavioural scenarios for the mapping engine, built with the programmatic
//! mapping API and deterministic UUIDs.

use x3ml::config::EngineConfig;
use x3ml::engine::Engine;
use x3ml::error::{ConfigError, X3mlError};
use x3ml::generator::custom::CustomGeneratorFailure;
use x3ml::generator::{CustomGenerator, CustomGeneratorRegistry, GeneratedValue, GeneratorPolicy, GeneratorSpec, ValueKind};
use x3ml::model::namespace::{RDFS_LABEL, XSD_DATE_TIME};
use x3ml::model::{
    Condition, Domain, Entity, GeneratorArg, GeneratorCall, Link, Mapping, MappingDocument, Namespaces, Path,
    Range, SourceRelation,
};
use x3ml::terminology::StaticTerminology;

const CRM: &str = "http://www.cidoc-crm.org/cidoc-crm/";
const EX: &str = "http://example.org/";

fn crm(local: &str) -> String {
    format!("{CRM}{local}")
}

fn namespaces() -> Namespaces {
    Namespaces::new().with_prefix("crm", CRM).with_prefix("ex", EX)
}

fn document(mappings: Vec<Mapping>) -> MappingDocument {
    mappings
        .into_iter()
        .fold(MappingDocument::new(namespaces()), MappingDocument::with_mapping)
}

fn engine(mappings: Vec<Mapping>) -> Engine {
    engine_with(mappings, GeneratorPolicy::new())
}

fn engine_with(mappings: Vec<Mapping>, policy: GeneratorPolicy) -> Engine {
    Engine::new(document(mappings), policy).with_config(EngineConfig::deterministic(2))
}

fn uuid(types: &[&str]) -> Entity {
    Entity::new(types.iter().copied()).with_generator(GeneratorCall::new("UUID"))
}

fn literal(expression: &str) -> GeneratorCall {
    GeneratorCall::new("Literal").with_arg(GeneratorArg::xpath("text", expression))
}

fn plain(value: &str) -> GeneratedValue {
    GeneratedValue::literal(value, None)
}

#[test]
fn simple_literal() {
    let person = uuid(&["crm:E21_Person"]).with_label(literal("name/text()"));
    let report = engine(vec![Mapping::new(Domain::new("/people/person", person))])
        .execute_str("<people><person><name>Ada</name></person></people>")
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.graph.subjects_of_type(&crm("E21_Person")), vec!["uuid:AA"]);
    assert!(report.graph.contains("uuid:AA", RDFS_LABEL, &plain("Ada")));
    assert_eq!(report.graph.len(), 2);
}

fn join_policy() -> GeneratorPolicy {
    GeneratorPolicy::new()
        .with_generator(GeneratorSpec::pattern("ItemURI", "item/{id}").with_prefix("ex"))
        .with_generator(GeneratorSpec::pattern("OwnerURI", "owner/{ref}").with_prefix("ex"))
}

fn join_mapping(range_source: &str) -> Mapping {
    let item = Entity::new(["crm:E22_Human-Made_Object"])
        .with_generator(GeneratorCall::new("ItemURI").with_arg(GeneratorArg::xpath("id", "id/text()")));
    let owner = Entity::new(["crm:E39_Actor"])
        .with_generator(GeneratorCall::new("OwnerURI").with_arg(GeneratorArg::xpath("ref", "ref/text()")));
    let path = Path::new("id/text()==ref/text()", "crm:P52_has_current_owner");
    Mapping::new(Domain::new("/root/item", item)).with_link(Link::new(path, Range::new(range_source, owner)))
}

const JOIN_XML: &str = r#"<root>
  <item><id>5</id></item>
  <item><id>7</id></item>
  <owner><ref>5</ref><name>A</name></owner>
  <owner><ref>9</ref><name>B</name></owner>
</root>"#;

#[test]
fn equality_join_links_matching_keys_only() {
    let report = engine_with(vec![join_mapping("/root/owner")], join_policy())
        .execute_str(JOIN_XML)
        .unwrap();

    let p52 = crm("P52_has_current_owner");
    assert_eq!(
        report.graph.objects(&format!("{EX}item/5"), &p52),
        vec![format!("{EX}owner/5")]
    );
    assert!(report.graph.objects(&format!("{EX}item/7"), &p52).is_empty());
    assert_eq!(report.graph.subjects_of_type(&crm("E39_Actor")), vec![format!("{EX}owner/5")]);
    assert_eq!(report.stats.ranges_linked, 1);
    assert_eq!(report.stats.range_maps_built, 1);
    assert!(report.is_complete());
}

#[test]
fn equality_join_reads_key_from_range_parent() {
    // Range nodes are the owners' <name> children; the key lives on the owner.
    let mut mapping = join_mapping("/root/owner/name");
    mapping.links[0].range.target.entity = uuid(&["crm:E39_Actor"]);
    let report = engine_with(vec![mapping], join_policy())
        .execute_str(JOIN_XML)
        .unwrap();
    let p52 = crm("P52_has_current_owner");
    let linked = report.graph.objects(&format!("{EX}item/5"), &p52);
    assert_eq!(linked, vec!["uuid:AA"]);
    assert_eq!(report.stats.ranges_linked, 1);
}

#[test]
fn equality_join_through_one_hop() {
    let xml = r#"<root>
  <item><id>5</id></item>
  <ownership><item>5</item><owner>o1</owner></ownership>
  <ownership><item>6</item><owner>o2</owner></ownership>
  <owner><ref>o1</ref></owner>
  <owner><ref>o2</ref></owner>
</root>"#;
    let mut mapping = join_mapping("/root/owner");
    mapping.links[0].path.source_relation =
        SourceRelation::join_via("id/text()==item/text()", "/root/ownership", "owner/text()==ref/text()");
    let report = engine_with(vec![mapping], join_policy()).execute_str(xml).unwrap();
    assert_eq!(
        report.graph.objects(&format!("{EX}item/5"), &crm("P52_has_current_owner")),
        vec![format!("{EX}owner/o1")]
    );
}

#[test]
fn merge_attaches_range_to_domain() {
    let merged = Entity::new(["crm:E39_Actor"])
        .with_label(literal("name/text()"))
        .with_additional("crm:P2_has_type", uuid(&["crm:E55_Type"]));
    let mapping = Mapping::new(Domain::new("/people/person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(Path::new("name", "MERGE"), Range::new("name", merged)));
    let report = engine(vec![mapping])
        .execute_str("<people><person><name>Ada</name></person></people>")
        .unwrap();

    assert!(report.is_complete());
    let graph = &report.graph;
    assert_eq!(graph.subjects_of_type(&crm("E39_Actor")), vec!["uuid:AA"]);
    assert!(graph.contains("uuid:AA", RDFS_LABEL, &plain("Ada")));
    assert_eq!(graph.objects("uuid:AA", &crm("P2_has_type")), vec!["uuid:AB"]);
    assert!(
        graph
            .to_canonical_lines()
            .unwrap()
            .iter()
            .all(|line| !line.contains("MERGE") && !line.ends_with("<uuid:AA> ."))
    );
    // E21 + E39 types, label, P2, E55 type
    assert_eq!(graph.len(), 5);
}

#[test]
fn runs_are_deterministic() {
    let person = uuid(&["crm:E21_Person"]).with_label(literal("name/text()"));
    let name = uuid(&["crm:E41_Appellation"]).with_label(literal("text()"));
    let mapping = Mapping::new(Domain::new("//person", person))
        .with_link(Link::new(Path::new("name", "crm:P1_is_identified_by"), Range::new("name", name)));
    let engine = engine(vec![mapping]);
    let xml = "<people><person><name>Ada</name><name>Augusta</name></person><person><name>Bob</name></person></people>";

    let first = engine.execute_str(xml).unwrap().graph.to_canonical_lines().unwrap();
    let second = engine.execute_str(xml).unwrap().graph.to_canonical_lines().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2 * 2 + 3 * 3);
}

#[test]
fn one_bad_domain_node_is_isolated() {
    let policy = GeneratorPolicy::new().with_generator(GeneratorSpec::pattern("PersonURI", "person/{id}").with_prefix("ex"));
    let person = Entity::new(["crm:E21_Person"])
        .with_generator(GeneratorCall::new("PersonURI").with_arg(GeneratorArg::xpath("id", "@id")));
    let xml = format!(
        "<people>{}</people>",
        (1..=10)
            .map(|i| if i == 3 { "<person/>".to_string() } else { format!("<person id=\"{i}\"/>") })
            .collect::<String>()
    );
    let report = engine_with(vec![Mapping::new(Domain::new("/people/person", person))], policy)
        .execute_str(&xml)
        .unwrap();

    let people = report.graph.subjects_of_type(&crm("E21_Person"));
    assert_eq!(people.len(), 9);
    assert!(!people.contains(&format!("{EX}person/3")));
    assert!(people.contains(&format!("{EX}person/4")));
    assert_eq!(report.diagnostics.len(), 1);
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.mapping, 1);
    assert_eq!(diagnostic.link, None);
    assert_eq!(diagnostic.xpath, "/people[1]/person[3]");
    assert_eq!(report.stats.domains_failed, 1);
}

#[test]
fn same_context_resolves_to_the_same_value() {
    let first = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])));
    let second = Mapping::new(Domain::new(
        "//person",
        uuid(&["crm:E21_Person"]).with_label(literal("name/text()")),
    ));
    let report = engine(vec![first, second])
        .execute_str("<people><person><name>Ada</name></person></people>")
        .unwrap();
    assert_eq!(report.graph.subjects_of_type(&crm("E21_Person")), vec!["uuid:AA"]);
    assert!(report.graph.contains("uuid:AA", RDFS_LABEL, &plain("Ada")));
    assert_eq!(report.graph.len(), 2);
}

#[test]
fn additional_siblings_of_one_type_stay_distinct() {
    let person = uuid(&["crm:E21_Person"])
        .with_additional("crm:P2_has_type", uuid(&["crm:E55_Type"]))
        .with_additional("crm:P2_has_type", uuid(&["crm:E55_Type"]));
    let report = engine(vec![Mapping::new(Domain::new("//person", person))])
        .execute_str("<people><person/></people>")
        .unwrap();
    let types = report.graph.objects("uuid:AA", &crm("P2_has_type"));
    assert_eq!(types, vec!["uuid:AB", "uuid:AC"]);
}

#[test]
fn variables_share_a_value_within_a_domain_node() {
    let birth = uuid(&["crm:E67_Birth"]).with_variable("b");
    let same_birth = Entity::new(["crm:E67_Birth"]).with_variable("b");
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(Path::new("birth", "crm:P98i_was_born"), Range::new("birth", birth)))
        .with_link(Link::new(
            Path::new("name", "crm:P1_is_identified_by"),
            Range::new("name", same_birth),
        ));
    let xml = "<people><person><birth/><name/></person><person><birth/><name/></person></people>";
    let report = engine(vec![mapping]).execute_str(xml).unwrap();
    assert!(report.is_complete());

    let people = report.graph.subjects_of_type(&crm("E21_Person"));
    assert_eq!(people.len(), 2);
    let mut births = Vec::new();
    for person in &people {
        let born = report.graph.objects(person, &crm("P98i_was_born"));
        assert_eq!(born.len(), 1);
        assert_eq!(report.graph.objects(person, &crm("P1_is_identified_by")), born);
        births.extend(born);
    }
    assert_ne!(births[0], births[1]);
}

#[test]
fn unbound_variable_is_a_link_diagnostic() {
    let dangling = Entity::new(["crm:E67_Birth"]).with_variable("never");
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(Path::new("birth", "crm:P98i_was_born"), Range::new("birth", dangling)));
    let report = engine(vec![mapping])
        .execute_str("<people><person><birth/></person></people>")
        .unwrap();

    assert_eq!(report.graph.subjects_of_type(&crm("E21_Person")), vec!["uuid:AA"]);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].link, Some(1));
    assert!(report.diagnostics[0].message.contains("never"));
}

#[test]
fn global_variables_cross_mappings() {
    let museum = uuid(&["crm:E40_Legal_Body"]).with_global_variable("museum");
    let member_of = Entity::new(["crm:E40_Legal_Body"]).with_global_variable("museum");
    let first = Mapping::new(Domain::new("/root/museum", museum));
    let second = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"]))).with_link(Link::new(
        Path::new("", "crm:P107i_is_current_or_former_member_of"),
        Range::new("", member_of),
    ));
    let report = engine(vec![first, second])
        .execute_str("<root><museum/><person/><person/></root>")
        .unwrap();

    let museums = report.graph.subjects_of_type(&crm("E40_Legal_Body"));
    assert_eq!(museums, vec!["uuid:AA"]);
    for person in report.graph.subjects_of_type(&crm("E21_Person")) {
        assert_eq!(
            report.graph.objects(&person, &crm("P107i_is_current_or_former_member_of")),
            vec!["uuid:AA"]
        );
    }
}

#[test]
fn intermediate_nodes_chain_properties() {
    let path = Path::chained(
        "birth",
        vec!["crm:P98i_was_born".into(), "crm:P4_has_time-span".into()],
        vec![uuid(&["crm:E67_Birth"])],
    );
    let span = uuid(&["crm:E52_Time-Span"]).with_label(literal("text()"));
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(path, Range::new("birth/date", span)));
    let report = engine(vec![mapping])
        .execute_str("<people><person><birth><date>1815</date></birth></person></people>")
        .unwrap();

    let graph = &report.graph;
    let births = graph.objects("uuid:AA", &crm("P98i_was_born"));
    assert_eq!(births.len(), 1);
    assert_eq!(graph.subjects_of_type(&crm("E67_Birth")), births);
    let spans = graph.objects(&births[0], &crm("P4_has_time-span"));
    assert_eq!(spans.len(), 1);
    assert_eq!(graph.objects(&spans[0], RDFS_LABEL), vec!["1815"]);
}

/// Custom generator whose value is not a valid IRI.
struct Unparseable;

impl CustomGenerator for Unparseable {
    fn set_argument(&mut self, _name: &str, _value: &str) -> Result<(), CustomGeneratorFailure> {
        Ok(())
    }

    fn value(&self) -> Result<String, CustomGeneratorFailure> {
        Ok("not an iri".into())
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Uuid
    }
}

#[test]
fn rejected_range_iri_leaves_no_partial_branch() {
    let path = Path::chained(
        "birth",
        vec!["crm:P98i_was_born".into(), "crm:P4_has_time-span".into()],
        vec![uuid(&["crm:E67_Birth"])],
    );
    let span = Entity::new(["crm:E52_Time-Span"]).with_generator(GeneratorCall::new("Broken"));
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(path, Range::new("birth/date", span)));
    let policy = GeneratorPolicy::new().with_generator(GeneratorSpec::custom("Broken", "test.Unparseable"));
    let report = engine_with(vec![mapping], policy)
        .with_custom_generators(CustomGeneratorRegistry::default().with("test.Unparseable", |_| Box::new(Unparseable)))
        .execute_str("<people><person><birth><date>1815</date></birth></person></people>")
        .unwrap();

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].link, Some(1));
    assert!(report.diagnostics[0].message.contains("not an iri"));
    let graph = &report.graph;
    assert_eq!(graph.subjects_of_type(&crm("E21_Person")), vec!["uuid:AA"]);
    assert!(graph.objects("uuid:AA", &crm("P98i_was_born")).is_empty());
    assert!(graph.subjects_of_type(&crm("E67_Birth")).is_empty());
    assert_eq!(graph.len(), 1);
}

#[test]
fn failing_intermediate_drops_only_its_branch() {
    let named = Entity::new(["crm:E67_Birth"])
        .with_generator(GeneratorCall::new("BirthURI").with_arg(GeneratorArg::xpath("id", "@id")));
    let path = Path::chained(
        "birth",
        vec!["crm:P98i_was_born".into(), "crm:P4_has_time-span".into()],
        vec![named],
    );
    let policy = GeneratorPolicy::new().with_generator(GeneratorSpec::pattern("BirthURI", "birth/{id}").with_prefix("ex"));
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])))
        .with_link(Link::new(path, Range::new("birth/date", uuid(&["crm:E52_Time-Span"]))));
    let xml = r#"<people><person><birth id="1"><date/></birth><birth><date/></birth></person></people>"#;
    let report = engine_with(vec![mapping], policy).execute_str(xml).unwrap();

    assert_eq!(
        report.graph.objects("uuid:AA", &crm("P98i_was_born")),
        vec![format!("{EX}birth/1")]
    );
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].xpath, "/people[1]/person[1]/birth[2]");
    assert!(report.diagnostics[0].message.contains("intermediate"));
}

#[test]
fn typed_literal_ranges() {
    let date = Entity::new(["xsd:dateTime"]).with_generator(literal("text()"));
    let mapping = Mapping::new(Domain::new("//event", uuid(&["crm:E5_Event"])))
        .with_link(Link::new(Path::new("date", "crm:P82_at_some_time_within"), Range::new("date", date)));
    let report = engine(vec![mapping])
        .execute_str("<r><event><date>1900-01-01T00:00:00</date></event></r>")
        .unwrap();
    assert!(report.graph.contains(
        "uuid:AA",
        &crm("P82_at_some_time_within"),
        &GeneratedValue::TypedLiteral {
            value: "1900-01-01T00:00:00".into(),
            datatype: XSD_DATE_TIME.into(),
        }
    ));
}

#[test]
fn named_graphs_follow_precedence() {
    let domain = Domain::new("//person", uuid(&["crm:E21_Person"]));
    let name = uuid(&["crm:E41_Appellation"]);
    let mapping = Mapping::new(domain)
        .with_named_graph("ex:mapping")
        .with_link(Link::new(Path::new("name", "crm:P1_is_identified_by"), Range::new("name", name)).with_named_graph("ex:link"));
    let report = engine(vec![mapping])
        .execute_str("<people><person><name/></person></people>")
        .unwrap();

    let graph = &report.graph;
    let rdf_type = x3ml::model::namespace::RDF_TYPE;
    let mapping_graph = format!("{EX}mapping");
    let link_graph = format!("{EX}link");
    assert!(graph.contains_in("uuid:AA", rdf_type, &GeneratedValue::uri(crm("E21_Person")), Some(mapping_graph.as_str())));
    assert!(graph.contains_in(
        "uuid:AA",
        &crm("P1_is_identified_by"),
        &GeneratedValue::uri("uuid:AB"),
        Some(link_graph.as_str())
    ));
    assert!(graph.contains_in("uuid:AB", rdf_type, &GeneratedValue::uri(crm("E41_Appellation")), Some(link_graph.as_str())));
    assert!(!graph.contains_in("uuid:AA", rdf_type, &GeneratedValue::uri(crm("E21_Person")), None));
}

#[test]
fn domain_named_graph_generator_overrides_mapping_graph() {
    let call = GeneratorCall::new("namedgraphURI").with_arg(GeneratorArg::constant("text", "http://example.org/graph/d"));
    let mapping = Mapping::new(Domain::new("//person", uuid(&["crm:E21_Person"])).with_named_graph(call))
        .with_named_graph("ex:mapping");
    let report = engine(vec![mapping]).execute_str("<people><person/></people>").unwrap();
    assert!(report.graph.contains_in(
        "uuid:AA",
        x3ml::model::namespace::RDF_TYPE,
        &GeneratedValue::uri(crm("E21_Person")),
        Some("http://example.org/graph/d")
    ));
}

#[test]
fn domain_conditions_filter_nodes() {
    let domain = Domain::new("//object", uuid(&["crm:E22_Human-Made_Object"]))
        .with_condition(Condition::equals("@type", "painting"));
    let report = engine(vec![Mapping::new(domain)])
        .execute_str(r#"<r><object type="painting"/><object type="coin"/><object type="painting"/></r>"#)
        .unwrap();
    assert_eq!(report.graph.subjects_of_type(&crm("E22_Human-Made_Object")).len(), 2);
    assert_eq!(report.stats.domains_matched, 3);
    assert_eq!(report.stats.domains_filtered, 1);
}

#[test]
fn broader_conditions_use_the_terminology() {
    let domain = Domain::new("//object", uuid(&["crm:E22_Human-Made_Object"]))
        .with_condition(Condition::broader("@type", "oil painting"));
    let terminology = StaticTerminology::new()
        .with_broader("oil painting", "painting")
        .with_broader("painting", "artwork");
    let report = engine(vec![Mapping::new(domain)])
        .with_terminology(terminology)
        .execute_str(r#"<r><object type="artwork"/><object type="coin"/><object type="oil painting"/></r>"#)
        .unwrap();
    assert_eq!(report.graph.subjects_of_type(&crm("E22_Human-Made_Object")).len(), 2);
}

#[test]
fn broader_without_terminology_aborts() {
    let domain = Domain::new("//object", uuid(&["crm:E22_Human-Made_Object"]))
        .with_condition(Condition::broader("@type", "artwork"));
    let err = engine(vec![Mapping::new(domain)])
        .execute_str(r#"<r><object type="coin"/></r>"#)
        .unwrap_err();
    assert!(matches!(err, X3mlError::Terminology(_)));
}

#[test]
fn terminology_conditions_abort_even_when_the_value_is_the_constant() {
    let domain = Domain::new("//object", uuid(&["crm:E22_Human-Made_Object"]))
        .with_condition(Condition::broader("@type", "artwork"));
    let err = engine(vec![Mapping::new(domain)])
        .execute_str(r#"<r><object type="artwork"/></r>"#)
        .unwrap_err();
    assert!(matches!(err, X3mlError::Terminology(_)));
}

#[test]
fn exists_discards_empty_elements() {
    let domain = Domain::new("//object", uuid(&["crm:E22_Human-Made_Object"]))
        .with_condition(Condition::exists("title"));
    let report = engine(vec![Mapping::new(domain)])
        .execute_str("<r><object><title/></object><object><title>X</title></object></r>")
        .unwrap();
    assert_eq!(report.stats.domains_filtered, 1);
    assert_eq!(report.graph.len(), 1);
}

#[test]
fn unknown_generator_aborts_before_output() {
    let entity = Entity::new(["crm:E21_Person"]).with_generator(GeneratorCall::new("Missing"));
    let err = engine(vec![Mapping::new(Domain::new("//person", entity))])
        .execute_str("<people><person/></people>")
        .unwrap_err();
    assert!(matches!(err, X3mlError::Config(ConfigError::UnknownGenerator { .. })));
}

#[test]
fn empty_labels_are_skipped_with_a_warning() {
    let person = uuid(&["crm:E21_Person"]).with_label(literal("name/text()"));
    let report = engine(vec![Mapping::new(Domain::new("//person", person))])
        .execute_str("<people><person/></people>")
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.graph.len(), 1);
}

#[test]
fn associations_record_sources() {
    let person = uuid(&["crm:E21_Person"]);
    let report = engine(vec![Mapping::new(Domain::new("//person", person))])
        .execute_str("<people><person/><person/></people>")
        .unwrap();
    assert_eq!(report.associations.values_for("/people[1]/person[2]"), vec!["uuid:AB"]);
    assert_eq!(report.associations.xpaths_for("uuid:AA"), vec!["/people[1]/person[1]"]);
}
