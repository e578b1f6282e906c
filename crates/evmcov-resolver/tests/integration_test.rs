// SPDX-License-Identifier: AGPL-3.0

#[cfg(test)]
mod tests {
    use evmcov_contract::{CompiledArtifact, ContractContext};
    use evmcov_resolver::ContractResolver;
    use std::sync::Arc;

    // 19-byte CBOR map followed by its length
    const METADATA: &str = "a264697066735822aaaa64736f6c63430008140013";

    fn runtime_body(tag: &str) -> String {
        format!("6080604052348015600f57600080fd5b50{}6000f3fe", tag.repeat(30))
    }

    fn artifact(name: &str, tag: &str) -> Arc<CompiledArtifact> {
        let runtime = format!("{}{}", runtime_body(tag), METADATA);
        Arc::new(CompiledArtifact {
            name: name.to_string(),
            creation_bytecode: format!("0x608060405234801561001057600080fd5b50{}", runtime),
            runtime_bytecode: format!("0x{}", runtime),
            ..Default::default()
        })
    }

    fn abstract_artifact() -> Arc<CompiledArtifact> {
        Arc::new(CompiledArtifact {
            name: "Abstract".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_resolves_runtime_with_different_metadata() {
        let resolver = ContractResolver::new(vec![artifact("A", "aa"), artifact("B", "bb")], 88);
        let observed = format!("0x{}a26469706673582299996473", runtime_body("bb"));

        let (found, context) = resolver.resolve_with_context(&observed).unwrap();
        assert_eq!(found.name, "B");
        assert_eq!(context, ContractContext::Runtime);
    }

    #[test]
    fn test_resolves_creation_with_constructor_arguments() {
        let resolver = ContractResolver::new(vec![artifact("A", "aa")], 88);
        let initcode = format!(
            "{}{}",
            resolver_initcode("aa"),
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
        let (found, context) = resolver.resolve_with_context(&initcode).unwrap();
        assert_eq!(found.name, "A");
        assert_eq!(context, ContractContext::Creation);
    }

    fn resolver_initcode(tag: &str) -> String {
        format!(
            "0x608060405234801561001057600080fd5b50{}{}",
            runtime_body(tag),
            METADATA
        )
    }

    #[test]
    fn test_unknown_code() {
        let resolver = ContractResolver::new(vec![artifact("A", "aa")], 88);
        assert!(resolver.resolve(&format!("0x{}", runtime_body("cc"))).is_none());
        assert!(resolver.resolve("0x").is_none());
    }

    #[test]
    fn test_abstract_contracts_are_never_matched() {
        let resolver = ContractResolver::new(vec![abstract_artifact(), artifact("A", "aa")], 88);
        assert_eq!(resolver.len(), 1);
        assert!(resolver.resolve("0x").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let resolver = ContractResolver::new(vec![artifact("First", "aa"), artifact("Second", "aa")], 88);
        let observed = format!("{}{}", runtime_body("aa"), METADATA);
        assert_eq!(resolver.resolve(&observed).unwrap().name, "First");
    }
}
