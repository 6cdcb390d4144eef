use alloy_sol_types::sol;

// Function names follow the deployed engine ABI, typos included; the selector
// is derived from them.
sol! {
    interface ILendingEngine {
        function getCurrentVaultId() external view returns (uint256 currentVaultId);
        function getVaultAddress(uint256 vaultId) external view returns (address collateral);
        function getVaultBalance(uint256 vaultId) external view returns (uint256 balance);
        function getUSDValueOfCollateral(address collateral, uint256 amount) external view returns (uint256 usdValue);
        function getCollateralDeposited(uint256 vaultId) external view returns (uint256 deposited);
        function getAmountCanBorrow(uint256 vaultId) external view returns (uint256 amount);
        function getAllPostionExists(address owner) external view returns (uint256[] positionIds);
        function getUniquePosition(uint256 positionId) external view returns (
            uint256 vaultId,
            address owner,
            uint256 amountCollateral,
            uint256 amountToBorrow,
            uint256 healthFactor
        );

        function depostionCollateral(uint256 vaultId, uint256 amount) external;
        function createPosition(uint256 vaultId, uint256 amountCollateral, uint256 amountToBorrow) external;
        function canclePosition(uint256 positionId) external;
    }
}

sol! {
    interface IERC20 {
        function name() external view returns (string name);
        function symbol() external view returns (string symbol);
        function decimals() external view returns (uint8 decimals);
        function balanceOf(address owner) external view returns (uint256 balance);
        function approve(address spender, uint256 amount) external returns (bool ok);
    }
}

sol! {
    /// Test collateral tokens mint a fixed amount to the caller.
    interface IMockToken {
        function faucet() external;
    }
}
