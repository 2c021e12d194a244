//! ABI surface of the contracts the provisioning engine talks to.
//!
//! Only the handful of functions the engine calls are declared here. Calldata
//! is built with the typed call structs generated by `sol!`.

use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolValue,
};

sol! {
    /// Per-chain deterministic deployer.
    interface IDeployer {
        function deployContract(bytes bytecode, bytes args) external returns (address deployed);
    }

    interface IVaultController {
        function addApprovedGateway(address gateway) external;
        function facetAddress() external view returns (address facet);
    }

    interface IModuleCatalog {
        function addOffering(address facet, address feeToken, uint256 feeAmount) external;
    }

    /// A remote chain registered on a routing-gateway.
    struct GatewayRoute {
        uint256 chainId;
        string chainName;
        address gatewayAddress;
    }

    interface IRoutingGateway {
        function initialize(GatewayRoute[] routes) external;
    }
}

/// Constructor arguments of the factory module.
pub fn factory_args(fee_token: Address, creation_fee: U256, owner: Address) -> Bytes {
    (fee_token, creation_fee, owner).abi_encode_params().into()
}

/// Constructor arguments of the module catalog.
pub fn module_catalog_args(owner: Address) -> Bytes {
    (owner,).abi_encode_params().into()
}

/// Constructor arguments of the vault-controller.
pub fn vault_controller_args(chain_id: u64, catalog: Address, owner: Address) -> Bytes {
    (U256::from(chain_id), catalog, owner)
        .abi_encode_params()
        .into()
}

/// Constructor arguments of the routing-gateway.
pub fn routing_gateway_args(
    chain_id: u64,
    vault_controller: Address,
    messaging_gateway: Address,
    messaging_gas_service: Address,
    owner: Address,
) -> Bytes {
    (
        U256::from(chain_id),
        vault_controller,
        messaging_gateway,
        messaging_gas_service,
        owner,
    )
        .abi_encode_params()
        .into()
}
